//! Companies House registry client and CRN verification.
//!
//! Wraps the official registry's REST API (company profile, name search,
//! officers, persons with significant control) and implements the local CRN
//! format check that gates every network lookup.
//!
//! Error classification matters here: 404 is a conclusive "no such company"
//! outcome, 401/403 is a configuration problem, 429 is a rate limit that is
//! never silently retried, and anything else is a generic upstream failure.

mod client;
mod format;

pub use client::{
    CompanyProfile, CompanySearchItem, CrnVerification, FetchedProfile, RegistryClient,
};
pub use format::validate_crn_format;
