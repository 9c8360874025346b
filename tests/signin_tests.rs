mod common;

use common::{harness, quick_job, site};
use forum_pilot::config::SiteConfig;
use forum_pilot::db::PluginData;
use forum_pilot::plugins::Plugin;
use forum_pilot::plugins::signin::{SignInConfig, SignInPlugin, SignInRecord, SignInStatus};
use forum_pilot::types::{RunStatus, TriggerSource};
use mockito::Matcher;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const SIGN_PAGE: &str = r#"<html><body>
  <a href="member.php?mod=logging&amp;action=logout">退出</a>
  <form><input type="hidden" name="formhash" value="1a2b3c4d" /></form>
</body></html>"#;

const LOGGED_OUT_PAGE: &str = r#"<html><body><a href="login">登录</a></body></html>"#;

fn config(sites: &[&str]) -> SignInConfig {
    SignInConfig {
        job: quick_job(),
        sites: sites.iter().map(|s| s.to_string()).collect(),
        login_page_path: "login".to_string(),
        login_path: "login/submit".to_string(),
        signin_page_path: "sign".to_string(),
        signin_path: "sign/{formhash}".to_string(),
        credit_path: Some("credit".to_string()),
        ..SignInConfig::default()
    }
}

fn with_cookie(mut s: SiteConfig) -> SiteConfig {
    s.cookie = Some("auth=1; uid=7".to_string());
    s
}

#[tokio::test]
async fn signs_in_with_cookie_and_records_history() {
    let mut server = mockito::Server::new_async().await;
    let page = server
        .mock("GET", "/sign")
        .match_header("cookie", Matcher::Regex("auth=1".into()))
        .with_body(SIGN_PAGE)
        .create_async()
        .await;
    let submit = server
        .mock("GET", "/sign/1a2b3c4d")
        .with_body("<root><![CDATA[签到成功]]></root>")
        .expect(1)
        .create_async()
        .await;
    let credit = server
        .mock("GET", "/credit")
        .with_body(r#"<span id="extcreditmenu">积分: 120</span>"#)
        .create_async()
        .await;

    let mut sites = BTreeMap::new();
    sites.insert("forum".to_string(), with_cookie(site(&server.url())));
    let h = harness(sites);
    let runtime = h.deps.runtime(Arc::new(SignInPlugin::new(config(&["forum"]))));

    let outcome = runtime.run_once(TriggerSource::Manual).await;
    assert_eq!(outcome.status, RunStatus::Succeeded, "{}", outcome.summary);
    assert!(outcome.summary.starts_with("forum: signed in"));
    assert!(outcome.summary.contains("120"));

    let data = PluginData::new(h.store.clone(), "signin");
    let history: Vec<SignInRecord> = data.load("history").await.unwrap().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SignInStatus::Success);
    let last: HashMap<String, SignInRecord> = data.load("last").await.unwrap().unwrap();
    assert_eq!(last["forum"].credit.as_deref(), Some("积分: 120"));

    page.assert_async().await;
    submit.assert_async().await;
    credit.assert_async().await;
}

#[tokio::test]
async fn already_signed_skips_the_submit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/sign")
        .with_body(format!("{SIGN_PAGE}<p>您今天已签到</p>"))
        .create_async()
        .await;
    let submit = server
        .mock("GET", Matcher::Regex("^/sign/".into()))
        .expect(0)
        .create_async()
        .await;
    server
        .mock("GET", "/credit")
        .with_status(500)
        .create_async()
        .await;

    let mut sites = BTreeMap::new();
    sites.insert("forum".to_string(), with_cookie(site(&server.url())));
    let h = harness(sites);
    let runtime = h.deps.runtime(Arc::new(SignInPlugin::new(config(&["forum"]))));

    let report = runtime.plugin.run(&runtime.ctx).await.unwrap();
    assert_eq!(report.lines, vec!["forum: already signed in".to_string()]);
    submit.assert_async().await;
}

#[tokio::test]
async fn logs_in_with_password_when_cookie_is_missing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/sign")
        .match_header("cookie", Matcher::Missing)
        .with_body(LOGGED_OUT_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/login")
        .with_body(r#"<input type="hidden" name="formhash" value="ffff0000" />"#)
        .create_async()
        .await;
    let login = server
        .mock("POST", "/login/submit")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("username".into(), "alice".into()),
            Matcher::UrlEncoded("password".into(), "hunter2".into()),
            Matcher::UrlEncoded("formhash".into(), "ffff0000".into()),
        ]))
        .with_header("set-cookie", "auth=ok; Path=/")
        .with_body("<root>欢迎您回来</root>")
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/sign")
        .match_header("cookie", Matcher::Regex("auth=ok".into()))
        .with_body(SIGN_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/sign/1a2b3c4d")
        .with_body("sign in success")
        .create_async()
        .await;
    server
        .mock("GET", "/credit")
        .with_body("<p>nothing here</p>")
        .create_async()
        .await;

    let mut s = site(&server.url());
    s.username = Some("alice".to_string());
    s.password = Some("hunter2".to_string());
    let mut sites = BTreeMap::new();
    sites.insert("forum".to_string(), s);
    let h = harness(sites);
    let runtime = h.deps.runtime(Arc::new(SignInPlugin::new(config(&["forum"]))));

    let outcome = runtime.run_once(TriggerSource::Manual).await;
    assert_eq!(outcome.status, RunStatus::Succeeded, "{}", outcome.summary);
    assert_eq!(outcome.summary, "forum: signed in");
    login.assert_async().await;
}

#[tokio::test]
async fn every_site_failing_fails_the_run_and_notifies() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/sign")
        .with_body(LOGGED_OUT_PAGE)
        .create_async()
        .await;

    let mut sites = BTreeMap::new();
    sites.insert("forum".to_string(), site(&server.url()));
    let h = harness(sites);
    let runtime = h.deps.runtime(Arc::new(SignInPlugin::new(config(&["forum"]))));

    let outcome = runtime.run_once(TriggerSource::Schedule).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.summary.contains("no username/password"));

    let history: Vec<SignInRecord> = PluginData::new(h.store.clone(), "signin")
        .load("history")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history[0].status, SignInStatus::Failed);
    assert_eq!(h.notifier.sent().len(), 1);
}
