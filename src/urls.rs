//! Analytics URL construction.
//!
//! Deterministic given the inputs; champion names must already be in
//! canonical form (see [`crate::registry::normalise`]) and an unknown role
//! simply omits the trailing segment.

use crate::roles::Role;

#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base: String,
}

impl UrlBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn champion(&self, champ: &str) -> String {
        format!("{}/champion/{}", self.base, champ)
    }

    pub fn build_guide(&self, champ: &str, role: Option<Role>) -> String {
        self.with_role(format!("{}/champion/{}/build", self.base, champ), role)
    }

    pub fn counters(&self, champ: &str, role: Option<Role>) -> String {
        self.with_role(format!("{}/champion/{}/counters", self.base, champ), role)
    }

    pub fn matchup(&self, champ: &str, opponent: &str, role: Option<Role>) -> String {
        self.with_role(
            format!("{}/champion/{}/matchup/{}", self.base, champ, opponent),
            role,
        )
    }

    fn with_role(&self, mut url: String, role: Option<Role>) -> String {
        if let Some(role) = role.filter(|r| r.is_known()) {
            url.push('/');
            url.push_str(&role.to_string());
        }
        url
    }
}
