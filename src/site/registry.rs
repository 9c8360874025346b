use crate::config::{JobSettings, SiteConfig};
use crate::error::PilotError;
use crate::site::session::SiteSession;
use std::collections::BTreeMap;
use url::Url;

/// Named site credentials, as configured under `[sites.*]`.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteConfig>,
}

impl SiteRegistry {
    pub fn new(sites: BTreeMap<String, SiteConfig>) -> Self {
        Self { sites }
    }

    pub fn get(&self, name: &str) -> Result<&SiteConfig, PilotError> {
        self.sites
            .get(name)
            .ok_or_else(|| PilotError::UnknownSite(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    /// Registered site whose base URL shares the host (and port) of `url`.
    pub fn find_by_url(&self, url: &Url) -> Option<&str> {
        self.sites.iter().find_map(|(name, site)| {
            let base = site.base_url.as_ref()?;
            (base.host_str() == url.host_str() && base.port_or_known_default() == url.port_or_known_default())
                .then_some(name.as_str())
        })
    }

    pub fn session(
        &self,
        name: &str,
        job: &JobSettings,
        proxy: Option<&Url>,
    ) -> Result<SiteSession, PilotError> {
        SiteSession::new(name, self.get(name)?, job, proxy)
    }

    /// Session for an arbitrary page: the matching registered site, else an anonymous one.
    pub fn session_for_url(
        &self,
        url: &Url,
        job: &JobSettings,
        proxy: Option<&Url>,
    ) -> Result<SiteSession, PilotError> {
        match self.find_by_url(url) {
            Some(name) => self.session(name, job, proxy),
            None => {
                let mut base = url.clone();
                base.set_path("/");
                base.set_query(None);
                base.set_fragment(None);
                SiteSession::anonymous(base, job, proxy)
            }
        }
    }
}
