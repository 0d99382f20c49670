//! `list` command.

use crate::session::Session;

/// Re-enumerate devices, print the summary and remember the lists for
/// `create`.
pub fn list(session: &mut Session) -> anyhow::Result<()> {
    let listing = session.router().catalog().enumerate()?;
    println!("{listing}");
    session.set_listing(listing);
    Ok(())
}
