//! Disposable Postgres databases for store integration tests.
//!
//! `DNSFLEET_TEST_DATABASE_URL` points at an existing server on which a
//! uniquely named database is created and dropped again. Without it a
//! throwaway cluster is initialised from local `initdb`/`postgres` binaries.
//! Callers skip their suite when [`start_postgres`] fails.

use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::NoTls;
use url::Url;

/// Environment variable naming an existing server to use.
pub const DATABASE_URL_ENV: &str = "DNSFLEET_TEST_DATABASE_URL";

/// A database that is dropped (and its cluster stopped) on drop.
pub struct TestDatabase {
    url: String,
    admin_url: String,
    name: String,
    cluster: Option<LocalCluster>,
}

impl TestDatabase {
    /// Connection string for `sqlx`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let _ = run_admin(&self.admin_url, format!("DROP DATABASE IF EXISTS \"{}\"", self.name));
        if let Some(cluster) = self.cluster.take() {
            cluster.stop();
        }
    }
}

struct LocalCluster {
    process: Child,
    data_dir: PathBuf,
}

impl LocalCluster {
    fn stop(mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        let _ = fs::remove_dir_all(&self.data_dir);
    }
}

/// Create a fresh database.
///
/// # Errors
///
/// Returns an error when no server is configured and no local Postgres
/// installation can be started.
pub fn start_postgres() -> Result<TestDatabase> {
    match std::env::var(DATABASE_URL_ENV) {
        Ok(url) => create_database(&url, None),
        Err(_) => {
            let (cluster, url) = start_cluster()?;
            create_database(&url, Some(cluster))
        }
    }
}

fn create_database(server_url: &str, cluster: Option<LocalCluster>) -> Result<TestDatabase> {
    let server = Url::parse(server_url).context("invalid postgres connection url")?;
    let name = unique_name();
    let mut admin = server.clone();
    admin.set_path("/postgres");
    let mut target = server;
    target.set_path(&format!("/{name}"));

    run_admin(admin.as_str(), format!("CREATE DATABASE \"{name}\""))?;
    Ok(TestDatabase {
        url: target.to_string(),
        admin_url: admin.to_string(),
        name,
        cluster,
    })
}

fn run_admin(admin_url: &str, statement: String) -> Result<()> {
    let admin_url = admin_url.to_string();
    thread::spawn(move || -> Result<()> {
        let mut client = postgres::Config::from_str(&admin_url)?.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .with_context(|| format!("failed to run `{statement}`"))
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin connection thread panicked")))
}

fn start_cluster() -> Result<(LocalCluster, String)> {
    let initdb = locate("initdb")?;
    let postgres = locate("postgres")?;
    let pg_isready = locate("pg_isready")?;

    let data_dir = std::env::temp_dir().join(unique_name());
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let data = data_dir
        .to_str()
        .context("data dir contains non-utf8 characters")?
        .to_string();

    let status = Command::new(initdb)
        .args(["-D", &data, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !status.success() {
        bail!("initdb exited with failure status");
    }

    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .context("failed to reserve port")?
        .port()
        .to_string();
    let process = Command::new(postgres)
        .args(["-D", &data, "-p", &port, "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres")?;
    let cluster = LocalCluster { process, data_dir };

    let ready = (0..30).any(|_| {
        let ok = Command::new(&pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port, "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if !ok {
            thread::sleep(Duration::from_millis(200));
        }
        ok
    });
    if !ready {
        cluster.stop();
        bail!("postgres did not become ready in time");
    }
    Ok((cluster, format!("postgres://postgres@127.0.0.1:{port}/postgres")))
}

fn locate(binary: &str) -> Result<PathBuf> {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .chain(["/usr/lib/postgresql/16/bin", "/usr/local/bin"].map(PathBuf::from))
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.exists())
        .with_context(|| format!("{binary} binary is required for Postgres tests"))
}

fn unique_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("dnsfleet_test_{}_{nanos}", std::process::id())
}
