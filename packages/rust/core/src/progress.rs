//! Progress heuristic for job status reporting.

use kybcheck_shared::JobStatus;

/// Approximate completion percentage for a job.
///
/// This is a heuristic, not a measurement: a processing job advances with
/// its audit-log length and is capped below 100 until it actually finishes.
pub fn percent_complete(status: JobStatus, log_len: u32) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::ActionRequired => 50,
        JobStatus::Processing => {
            let estimated = ((log_len as f64 / 10.0) * 100.0).round() as u32;
            estimated.min(90) as u8
        }
        JobStatus::Completed | JobStatus::Failed => 100,
    }
}
