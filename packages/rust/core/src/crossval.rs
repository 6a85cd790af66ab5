//! Cross-validation of registry data against website-scraped data.
//!
//! Pure functions, no I/O: the secondary registry lookup that a name
//! mismatch can trigger is the orchestrator's job. A mismatch here is
//! evidence worth surfacing, never a hard failure — operational and
//! registered details legitimately diverge.

use kybcheck_registry::CompanyProfile;
use kybcheck_shared::{CheckOutcome, CheckStatus};
use kybcheck_similarity::similarity;
use kybcheck_webintel::WebsiteData;

/// Website-extracted company name must reach this similarity to the
/// registered name to count as a match.
const NAME_MATCH_THRESHOLD: f64 = 0.7;

/// Outcome of cross-validating one company profile against one website.
#[derive(Debug)]
pub struct CrossValidation {
    pub crn: CheckOutcome,
    pub name: CheckOutcome,
    pub address: CheckOutcome,
    /// Human-readable descriptions of every failed or warned check.
    pub issues: Vec<String>,
    /// The website's company name when it failed the match, kept so the
    /// orchestrator can run a secondary registry search for it.
    pub mismatched_name: Option<String>,
}

impl CrossValidation {
    pub fn crn_match(&self) -> bool {
        self.crn.status != CheckStatus::Fail
    }

    pub fn name_match(&self) -> bool {
        self.name.status != CheckStatus::Fail
    }

    pub fn address_match(&self) -> bool {
        matches!(self.address.status, CheckStatus::Pass | CheckStatus::Skipped)
    }
}

/// Compare the accepted registry profile with what the website says about
/// itself. Absent website data skips a check rather than failing it.
pub fn cross_validate(
    business_name: &str,
    profile: &CompanyProfile,
    website: &WebsiteData,
) -> CrossValidation {
    let mut issues = Vec::new();
    let mut mismatched_name = None;

    // CRN: case-insensitive equality, whitespace ignored.
    let crn = match &website.crn {
        None => CheckOutcome::skipped("website does not display a registration number"),
        Some(site_crn) if crn_equal(site_crn, &profile.company_number) => {
            CheckOutcome::pass(format!("website displays the verified CRN {}", profile.company_number))
        }
        Some(site_crn) => {
            issues.push(format!(
                "website displays CRN {site_crn} but the verified company is {}",
                profile.company_number
            ));
            CheckOutcome::fail(format!(
                "website CRN {site_crn} differs from registry CRN {}",
                profile.company_number
            ))
        }
    };

    // Name: similarity of the website's self-styled name to the registered one.
    let name = match &website.company_name {
        None => CheckOutcome::skipped("no company name found on the website"),
        Some(site_name) => {
            let score = similarity(site_name, &profile.company_name);
            if score >= NAME_MATCH_THRESHOLD {
                CheckOutcome::pass(format!(
                    "website name {site_name:?} matches registered name (similarity {score:.2})"
                ))
            } else {
                issues.push(format!(
                    "website styles itself {site_name:?} but the registry lists {:?} \
                     for the requested name {business_name:?} (similarity {score:.2})",
                    profile.company_name
                ));
                mismatched_name = Some(site_name.clone());
                CheckOutcome::fail(format!(
                    "website name {site_name:?} does not match {:?} (similarity {score:.2})",
                    profile.company_name
                ))
            }
        }
    };

    // Address: does the registered office contain the website's address?
    let address = match (&website.address, &profile.registered_office_address) {
        (None, _) => CheckOutcome::skipped("no address found on the website"),
        (_, None) => CheckOutcome::skipped("registry profile carries no registered address"),
        (Some(site_addr), Some(reg_addr)) => {
            let reg_norm = normalize_address(&reg_addr.to_single_line());
            let site_norm = normalize_address(site_addr);
            if !site_norm.is_empty() && reg_norm.contains(&site_norm) {
                CheckOutcome::pass("website address matches the registered office")
            } else {
                issues.push(format!(
                    "website address {site_addr:?} does not match the registered office {:?}",
                    reg_addr.to_single_line()
                ));
                CheckOutcome::warn("website address differs from the registered office")
            }
        }
    };

    CrossValidation {
        crn,
        name,
        address,
        issues,
        mismatched_name,
    }
}

fn crn_equal(a: &str, b: &str) -> bool {
    let clean = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase()
    };
    clean(a) == clean(b)
}

fn normalize_address(addr: &str) -> String {
    addr.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
