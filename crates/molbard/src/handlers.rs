//! Command handlers.
//!
//! Each handler runs to completion against the [`BarContext`] it is
//! lent. Only the datagram path produces a reply; stream and console
//! outcomes are reported through logs.

use molbar_core::{drink_requirement, requirement_for, servings_available, Atom, AtomCounts};
use molbar_protocol::{parse_for, Command, ParseError, Reply, Transport, MAX_LINE_LEN};
use tracing::{debug, error, info, warn};

use crate::reactor::BarContext;
use crate::store::StoreError;

/// What a stream session should do after one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Close,
}

// ============================================================================
// Inventory operations
// ============================================================================

/// Credits `quantity` atoms and publishes the new state.
pub fn add_atoms(
    ctx: &mut BarContext,
    atom: Atom,
    quantity: u64,
) -> Result<AtomCounts, StoreError> {
    match ctx.inventory_mut().credit(atom, quantity) {
        Ok(counts) => {
            info!(atom = %atom, quantity, "Atoms added");
            ctx.publish();
            Ok(counts)
        }
        Err(e) => {
            report_failure("ADD", &e);
            Err(e)
        }
    }
}

/// Withdraws `quantity` molecules named `molecule`.
///
/// Unknown names are refused without touching the inventory.
pub fn deliver_molecule(ctx: &mut BarContext, molecule: &str, quantity: u64) -> Reply {
    let requirement = requirement_for(molecule, quantity);
    if requirement.is_zero() {
        warn!(molecule, "Unknown molecule");
        return Reply::not_delivered(molecule);
    }

    match ctx.inventory_mut().try_debit(&requirement) {
        Ok(_) => {
            info!(molecule, quantity, "Delivered");
            ctx.publish();
            Reply::delivered(molecule)
        }
        Err(e) => {
            report_failure("DELIVER", &e);
            Reply::not_delivered(molecule)
        }
    }
}

/// Mixes one serving of `drink`. Returns true when it was served.
pub fn generate_drink(ctx: &mut BarContext, drink: &str) -> bool {
    let requirement = drink_requirement(drink);
    if requirement.is_zero() {
        warn!(drink, "Unknown drink");
        return false;
    }

    let servings = servings_available(&ctx.inventory().snapshot(), &requirement);
    info!(drink, servings_available = servings, "Drink requested");

    match ctx.inventory_mut().try_debit(&requirement) {
        Ok(_) => {
            info!(drink, "Served");
            ctx.publish();
            true
        }
        Err(e) => {
            report_failure("GEN", &e);
            info!("{}", Reply::not_delivered(drink));
            false
        }
    }
}

fn report_failure(command: &str, err: &StoreError) {
    if err.is_rejection() {
        info!(command, reason = %err, "Operation refused");
    } else {
        error!(command, error = %err, "Operation not applied");
    }
}

// ============================================================================
// Per-transport entry points
// ============================================================================

/// Applies one line received from stream connection `connection`.
pub fn handle_stream_line(ctx: &mut BarContext, connection: u64, line: &str) -> LineOutcome {
    match parse_for(Transport::Stream, line) {
        Ok(Command::Add { atom, quantity }) => {
            // Failures are already logged; the session continues.
            let _ = add_atoms(ctx, atom, quantity);
            LineOutcome::Continue
        }
        Ok(Command::Exit) => {
            debug!(connection, "Client ended session");
            LineOutcome::Close
        }
        Ok(other) => {
            warn!(connection, command = %other, "Unexpected stream command");
            LineOutcome::Continue
        }
        Err(ParseError::Empty) => LineOutcome::Continue,
        Err(e) => {
            warn!(connection, error = %e, "Invalid command");
            LineOutcome::Continue
        }
    }
}

/// Answers one datagram. Only the first line of the payload is read.
pub fn handle_datagram(ctx: &mut BarContext, payload: &[u8]) -> Reply {
    if payload.len() > MAX_LINE_LEN {
        let err = ParseError::TooLong {
            len: payload.len(),
            max: MAX_LINE_LEN,
        };
        warn!(error = %err, "Invalid datagram");
        return Reply::invalid(err.to_string());
    }

    let text = String::from_utf8_lossy(payload);
    let line = text.lines().next().unwrap_or("").trim_end_matches('\0');

    match parse_for(Transport::Datagram, line) {
        Ok(Command::Deliver { molecule, quantity }) => deliver_molecule(ctx, &molecule, quantity),
        Ok(other) => {
            warn!(command = %other, "Unexpected datagram command");
            Reply::invalid(format!("{} is not accepted here", other.keyword()))
        }
        Err(e) => {
            warn!(error = %e, "Invalid datagram");
            Reply::invalid(e.to_string())
        }
    }
}

/// Applies one console line. `EXIT`/`quit` requests shutdown.
pub fn handle_console_line(ctx: &mut BarContext, line: &str) {
    match parse_for(Transport::Console, line) {
        Ok(Command::Gen { drink }) => {
            generate_drink(ctx, &drink);
        }
        Ok(Command::Exit) => {
            ctx.request_shutdown(crate::reactor::ShutdownReason::ConsoleQuit);
        }
        Ok(other) => warn!(command = %other, "Unexpected console command"),
        Err(ParseError::Empty) => {}
        Err(e) => warn!(error = %e, "Invalid console command"),
    }
}
