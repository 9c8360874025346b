use crate::config::{DEFAULT_USER_AGENT, JobSettings, SiteConfig};
use crate::error::{IsRetryable, PilotError};
use backon::{ConstantBuilder, Retryable};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Fixed-delay retry built from a plugin's job settings.
pub fn retry_policy(job: &JobSettings) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(Duration::from_secs(job.retry_interval_secs))
        .with_max_times(job.retry_times)
}

/// Cookie-holding HTTP client bound to one site.
#[derive(Clone)]
pub struct SiteSession {
    name: String,
    base: Url,
    client: reqwest::Client,
    jar: Arc<Jar>,
    retry: ConstantBuilder,
}

impl SiteSession {
    /// Build a session for a registered site; the configured cookie string seeds the jar.
    pub fn new(
        name: &str,
        site: &SiteConfig,
        job: &JobSettings,
        proxy: Option<&Url>,
    ) -> Result<Self, PilotError> {
        let base = site
            .base_url
            .clone()
            .ok_or_else(|| PilotError::Config(format!("site `{name}` has no base_url")))?;
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = site.cookie.as_deref() {
            seed_cookies(&jar, cookie, &base);
        }
        let ua = site.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let client = build_client(jar.clone(), ua, site.timeout_secs, job, proxy)?;
        Ok(Self {
            name: name.to_string(),
            base,
            client,
            jar,
            retry: retry_policy(job),
        })
    }

    /// Session for a page on a site that is not in the registry.
    pub fn anonymous(base: Url, job: &JobSettings, proxy: Option<&Url>) -> Result<Self, PilotError> {
        let jar = Arc::new(Jar::default());
        let client = build_client(jar.clone(), DEFAULT_USER_AGENT, 20, job, proxy)?;
        Ok(Self {
            name: base.host_str().unwrap_or("anonymous").to_string(),
            base,
            client,
            jar,
            retry: retry_policy(job),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` against the site base; absolute URLs pass through.
    pub fn url(&self, path: &str) -> Result<Url, PilotError> {
        Ok(self.base.join(path)?)
    }

    pub fn add_cookies(&self, cookie: &str) {
        seed_cookies(&self.jar, cookie, &self.base);
    }

    pub async fn get_text(&self, path: &str) -> Result<String, PilotError> {
        let url = self.url(path)?;
        self.with_retry("GET", &url, || {
            let req = self.client.get(url.clone());
            async move { read_text(req.send().await?).await }
        })
        .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PilotError> {
        let url = self.url(path)?;
        let body = self
            .with_retry("GET", &url, || {
                let req = self
                    .client
                    .get(url.clone())
                    .header(ACCEPT, "application/json");
                async move { read_text(req.send().await?).await }
            })
            .await?;
        serde_json::from_str(&body).map_err(|e| {
            PilotError::UnexpectedResponse(format!("{} returned non-JSON body: {e}", url))
        })
    }

    pub async fn post_form_text(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<String, PilotError> {
        let url = self.url(path)?;
        self.with_retry("POST", &url, || {
            let req = self.client.post(url.clone()).form(form);
            async move { read_text(req.send().await?).await }
        })
        .await
    }

    async fn with_retry<F, Fut>(&self, method: &str, url: &Url, op: F) -> Result<String, PilotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, PilotError>>,
    {
        let body = op
            .retry(self.retry.clone())
            .when(|e: &PilotError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(
                    site = %self.name,
                    "{method} {url} failed: {err}; retrying in {:?}",
                    dur
                );
            })
            .await?;
        debug!(site = %self.name, bytes = body.len(), "{method} {url}");
        Ok(body)
    }
}

async fn read_text(resp: reqwest::Response) -> Result<String, PilotError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(PilotError::UpstreamStatus(status));
    }
    Ok(resp.text().await?)
}

fn build_client(
    jar: Arc<Jar>,
    user_agent: &str,
    timeout_secs: u64,
    job: &JobSettings,
    proxy: Option<&Url>,
) -> Result<reqwest::Client, PilotError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));

    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .cookie_provider(jar)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs.max(1)));
    if job.use_proxy
        && let Some(proxy_url) = proxy
    {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

/// Split a `k=v; k2=v2` cookie header into individual jar entries.
fn seed_cookies(jar: &Jar, cookie: &str, base: &Url) {
    for pair in cookie.split(';') {
        let pair = pair.trim();
        if pair.is_empty() || !pair.contains('=') {
            continue;
        }
        jar.add_cookie_str(&format!("{pair}; Path=/"), base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(retries: usize) -> JobSettings {
        JobSettings {
            retry_times: retries,
            retry_interval_secs: 0,
            ..JobSettings::default()
        }
    }

    fn site(base: &str) -> SiteConfig {
        SiteConfig {
            base_url: Some(Url::parse(base).unwrap()),
            cookie: Some("uid=7; pass=abc".to_string()),
            ..SiteConfig::default()
        }
    }

    #[test]
    fn relative_paths_join_base() {
        let s = SiteSession::new("forum", &site("https://forum.example.org/bbs/"), &job(0), None)
            .unwrap();
        assert_eq!(
            s.url("plugin.php?id=sign").unwrap().as_str(),
            "https://forum.example.org/bbs/plugin.php?id=sign"
        );
        assert_eq!(
            s.url("https://other.example/u/1").unwrap().as_str(),
            "https://other.example/u/1"
        );
    }

    #[tokio::test]
    async fn sends_seeded_cookie_and_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/page")
            .match_header("cookie", mockito::Matcher::Regex("uid=7".into()))
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let s = SiteSession::new("forum", &site(&server.url()), &job(2), None).unwrap();
        let err = s.get_text("/page").await.unwrap_err();
        assert!(matches!(err, PilotError::UpstreamStatus(code) if code.as_u16() == 502));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let missing = server
            .mock("GET", "/gone")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let s = SiteSession::new("forum", &site(&server.url()), &job(3), None).unwrap();
        assert!(s.get_text("/gone").await.is_err());
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_responses_are_not_retried() {
        use std::io::Write;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        std::thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(b"this is not http\r\n\r\n");
            }
        });

        let s = SiteSession::new("forum", &site(&format!("http://{addr}/")), &job(2), None)
            .unwrap();
        let err = s.get_text("/page").await.unwrap_err();
        assert!(matches!(err, PilotError::Reqwest(_)));
        assert!(!err.is_retryable());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
