#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! `dnsfleet` entrypoint; all work happens in [`dnsfleet_app::run`].

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let code = dnsfleet_app::run().await;
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
