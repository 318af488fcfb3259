//! Shared harness for integration tests: a real server on an ephemeral
//! port with a throwaway document root.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use jaws::config::{ServerConfig, UserAccount};
use jaws::controllers::{default_controllers, Controller};
use jaws::lifecycle::{default_middleware, Application, Shutdown};
use jaws::persistence::Database;
use jaws::routing::RouteTable;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const USER: &str = "ana";
pub const PASSWORD: &str = "hunter2";

/// A running server. Shuts down when dropped.
pub struct TestApp {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub docs: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Document root with the page shell, a few partials and a static asset.
pub fn document_root() -> TempDir {
    let docs = tempfile::tempdir().unwrap();
    let root = docs.path();
    fs::write(root.join("_base.html"), "<body>{{_BODY_CONTENT_}}</body>").unwrap();
    fs::write(
        root.join("_home.html"),
        "{{if(isLoggedIn) signed-in else guest}}",
    )
    .unwrap();
    fs::write(root.join("_login.html"), "login {{error}}").unwrap();
    fs::write(root.join("_profile.html"), "profile {{userId}}").unwrap();
    fs::write(root.join("404.html"), "custom 404 {{getServerPort}}").unwrap();
    fs::write(root.join("stats.html"), "open={{getCurrentConnections}}").unwrap();
    fs::write(root.join("style.css"), "body{}").unwrap();
    fs::create_dir(root.join("docs")).unwrap();
    fs::write(root.join("docs").join("index.html"), "docs index").unwrap();
    docs
}

pub fn test_config(docs: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.documents.root = docs.path().to_path_buf();
    config.documents.not_found_page = Some("404.html".into());
    config.documents.watch = false;
    config.auth.secret = "integration".into();
    config.auth.users = vec![UserAccount {
        username: USER.into(),
        user_id: "7".into(),
        password: PASSWORD.into(),
    }];
    config
}

/// Start the server with the bundled controllers.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Start the server after letting the test adjust the configuration.
pub async fn spawn_app_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let docs = document_root();
    let mut config = test_config(&docs);
    tweak(&mut config);
    let app = Application::bind(config, &default_controllers()).await.unwrap();
    start(app, docs)
}

/// Start the server with `database` attached as the persistence backend.
pub async fn spawn_app_with_database<D: Database + 'static>(database: D) -> TestApp {
    let docs = document_root();
    let config = test_config(&docs);
    let app = Application::bind(config, &default_controllers()).await.unwrap();
    app.open_database(|_| Ok(database)).unwrap();
    start(app, docs)
}

/// Start the server with custom controllers.
pub async fn spawn_app_with_controllers(controllers: Vec<Box<dyn Controller>>) -> TestApp {
    let docs = document_root();
    let config = test_config(&docs);
    let mut builder = RouteTable::builder();
    for controller in &controllers {
        builder.routes(controller.routes()).unwrap();
    }
    let app = Application::bind_with(config, builder.build(), default_middleware)
        .await
        .unwrap();
    start(app, docs)
}

fn start(app: Application, docs: TempDir) -> TestApp {
    let addr = app.local_addr();
    let shutdown = app.shutdown();
    tokio::spawn(app.run());
    TestApp { addr, shutdown, docs }
}

/// Client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Write raw bytes and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Log in through the API and return the access token.
pub async fn login(app: &TestApp) -> String {
    let body: serde_json::Value = client()
        .post(app.url("/api/v1/auth/token"))
        .json(&serde_json::json!({ "user": USER, "password": PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["data"]["access_token"].as_str().unwrap().to_string()
}
