//! Guest ID and identity-scoped set commands.

use larder_core::{Identity, IdentitySignal, UserId};
use larder_store::{Larder, MigrationOutcome};
use tracing::{info, warn};

use super::{CliError, Resource};

/// Print the guest ID.
#[allow(clippy::print_stdout)]
pub fn guest_id(larder: &Larder) {
    println!("{}", larder.guest_id());
}

/// Print a wishlist or basket as JSON.
///
/// # Errors
///
/// Returns an error if `user` is not a valid user ID or the set is unreadable.
#[allow(clippy::print_stdout)]
pub fn show(larder: &Larder, resource: Resource, user: Option<&str>) -> Result<(), CliError> {
    let identity = match user {
        Some(raw) => Identity::User(UserId::parse(raw)?),
        None => Identity::Guest(larder.guest_id()),
    };

    let rendered = match resource {
        Resource::Wishlist => serde_json::to_string_pretty(&larder.wishlist(&identity)?)?,
        Resource::Basket => serde_json::to_string_pretty(&larder.basket(&identity)?)?,
    };
    println!("{rendered}");
    Ok(())
}

/// Merge this device's guest sets into `user`'s sets.
///
/// # Errors
///
/// Returns an error if `user` is not a valid user ID, or
/// [`CliError::MigrationFailed`] after all resources were attempted if any
/// of them failed.
#[allow(clippy::print_stdout)]
pub fn migrate(larder: &Larder, user: &str) -> Result<(), CliError> {
    let user = UserId::parse(user)?;
    let mut watcher = larder.watcher();

    let reports = watcher.observe(&IdentitySignal::authenticated(user.as_str()));
    let mut failures = 0_usize;
    for report in reports {
        match report.outcome {
            Ok(MigrationOutcome::NothingToMigrate) => {
                println!("{}: nothing to migrate", report.resource);
            }
            Ok(MigrationOutcome::Merged { guest_items, total }) => {
                println!("{}: merged {guest_items} guest items, {total} total", report.resource);
            }
            Err(e) => {
                warn!(resource = %report.resource, error = %e, "Migration failed");
                failures += 1;
            }
        }
    }

    info!(user = %user, failures, "Migration finished");
    if failures > 0 {
        return Err(CliError::MigrationFailed(failures));
    }
    Ok(())
}
