//! `mm whoami`: print the anonymous identity this client posts under.

use murmur_core::identity::UserId;
use serde::Serialize;
use std::io::Write;

use crate::cmd::resolve_user;
use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct WhoamiOutput {
    identity: UserId,
}

pub fn run_whoami(as_flag: Option<&str>, output: OutputMode) -> anyhow::Result<()> {
    let identity = resolve_user(as_flag, output)?;
    render(output, &WhoamiOutput { identity }, |p, w| {
        writeln!(w, "{}", p.identity)
    })
}
