//! Prompt loop state.

use crate::commands::{self, Flow, Parsed};
use patchbay_core::{DeviceListing, Router};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// One interactive session over a shared router.
pub struct Session {
    router: Arc<Router>,
    /// Lists from the most recent `list`; `create` positions index into these.
    listing: DeviceListing,
}

impl Session {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            listing: DeviceListing::default(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn listing(&self) -> &DeviceListing {
        &self.listing
    }

    pub fn set_listing(&mut self, listing: DeviceListing) {
        self.listing = listing;
    }

    /// Parse and run one line, printing its output.
    pub fn execute(&mut self, line: &str) -> Flow {
        match commands::parse(line) {
            Parsed::Empty => Flow::Continue,
            Parsed::Command(command) => {
                tracing::debug!(?command, "command");
                commands::run(command, self).unwrap_or_else(|e| {
                    println!("Error: {e}");
                    Flow::Continue
                })
            }
            Parsed::Help(text) => {
                print!("{text}");
                Flow::Continue
            }
            Parsed::BadValue(message) => {
                println!("Error: {message}");
                Flow::Continue
            }
            Parsed::Invalid => {
                println!("Invalid command. Try again or type 'exit' to quit.");
                Flow::Continue
            }
        }
    }

    /// Prompt and execute until `exit` or end of input.
    ///
    /// Lines that are not valid UTF-8 are decoded lossily, so they fail as an
    /// ordinary bad command instead of ending the session.
    pub fn run(&mut self, mut input: impl BufRead) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            print!("\nEnter command: ");
            io::stdout().flush()?;

            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                println!();
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            if self.execute(&line) == Flow::Exit {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::RouterConfig;
    use patchbay_io::MockBackend;

    fn session() -> Session {
        let router = Router::new(Arc::new(MockBackend::demo()), RouterConfig::default());
        Session::new(Arc::new(router))
    }

    #[test]
    fn invalid_utf8_line_does_not_end_session() {
        let mut session = session();
        session.execute("list");
        session
            .run(&b"create 0 1\n\xff\xfe\nstop 1\nexit\n"[..])
            .unwrap();
        // The route created before the bad line was stopped after it.
        assert_eq!(session.router().route_count(), 0);
        assert_eq!(session.router().list_active_routes().to_string(), "No active routes");
    }

    #[test]
    fn end_of_input_without_newline() {
        let mut session = session();
        session.execute("list");
        session.run(&b"create 0 1"[..]).unwrap();
        assert_eq!(session.router().route_count(), 1);
        session.router().close();
    }

    #[test]
    fn create_uses_listed_positions() {
        let mut session = session();
        // Nothing listed yet.
        session.execute("create 0 1");
        assert_eq!(session.router().route_count(), 0);

        session.execute("list");
        session.execute("create 0 1");
        let snapshot = session.router().list_active_routes();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.routes()[0].output.catalog_index, 2);
        session.router().close();
    }
}
