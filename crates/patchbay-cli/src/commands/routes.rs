//! `create`, `stop` and `routes` commands.

use crate::session::Session;
use patchbay_core::{RouteError, RouteId, RouteOptions};

/// Create a route between two list positions.
///
/// Positions outside the last listing print a hint instead of failing.
pub fn create(
    session: &Session,
    input: usize,
    output: usize,
    sample_rate: Option<u32>,
) -> anyhow::Result<()> {
    let listing = session.listing();
    let (Ok(input), Ok(output)) = (listing.input_at(input), listing.output_at(output)) else {
        println!("{}", RouteError::invalid_position());
        return Ok(());
    };
    let (input, output) = (input.clone(), output.clone());

    let router = session.router();
    let mut options = RouteOptions::from(router.config());
    if let Some(rate) = sample_rate {
        options.sample_rate = rate;
    }

    let id = router.create_route_with(input.catalog_index, output.catalog_index, options)?;
    println!(
        "Route {id} created: Device {} ({} ch) → Device {} ({} ch)",
        input.catalog_index, input.channels, output.catalog_index, output.channels
    );
    Ok(())
}

/// Stop a route by id.
pub fn stop(session: &Session, route_id: RouteId) -> anyhow::Result<()> {
    session.router().stop_route(route_id)?;
    println!("Route {route_id} removed");
    Ok(())
}

/// Print the active routes.
pub fn show(session: &Session) {
    println!("{}", session.router().list_active_routes());
}
