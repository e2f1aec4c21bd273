//! Listing revalidation: re-run the oracle for every listing on a touched name.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::chain::{ChainClient, Verification};
use crate::error::IndexerError;
use crate::store::ListingStore;

/// Tally of one revalidation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationReport {
    /// Listings the oracle was asked about.
    pub checked: usize,
    /// Listings persisted as valid.
    pub valid: usize,
    /// Listings persisted as invalid.
    pub invalid: usize,
}

impl RevalidationReport {
    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.checked += other.checked;
        self.valid += other.valid;
        self.invalid += other.invalid;
        self
    }
}

/// Re-verifies listings and persists `valid` + `height` for each.
#[derive(Clone)]
pub struct ListingRevalidator {
    chain: Arc<dyn ChainClient>,
    listings: Arc<dyn ListingStore>,
    max_concurrent_names: usize,
}

impl ListingRevalidator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        listings: Arc<dyn ListingStore>,
        max_concurrent_names: usize,
    ) -> Self {
        Self {
            chain,
            listings,
            max_concurrent_names: max_concurrent_names.max(1),
        }
    }

    /// Re-check every listing on `name` (previously invalid ones included).
    ///
    /// A transport failure from the oracle aborts before anything else for
    /// this name is written and is returned to the caller, so the height is
    /// never committed on stale validity.
    pub async fn revalidate(
        &self,
        name: &str,
        height: u64,
    ) -> Result<RevalidationReport, IndexerError> {
        let listings = self.listings.listings_by_name(name).await?;
        let mut report = RevalidationReport::default();

        for listing in listings {
            let outcome = self
                .chain
                .verify_listing(&listing.name, &listing.seller, &listing.signature, listing.price)
                .await;
            report.checked += 1;

            let valid = match outcome {
                Verification::Valid => true,
                Verification::Invalid { reason } => {
                    tracing::debug!(
                        name,
                        height,
                        signature = %listing.signature_hex(),
                        %reason,
                        "listing no longer valid"
                    );
                    false
                }
                Verification::Unavailable(err) => {
                    tracing::warn!(
                        name,
                        height,
                        signature = %listing.signature_hex(),
                        error = %err,
                        "verification oracle unavailable"
                    );
                    return Err(err);
                }
            };

            self.listings
                .update_validity(&listing.signature, valid, height)
                .await?;
            if valid {
                report.valid += 1;
            } else {
                report.invalid += 1;
            }
        }

        Ok(report)
    }

    /// Revalidate a set of names touched at `height`.
    ///
    /// Names are independent, so up to `max_concurrent_names` run at once.
    /// Returns only after every name has finished, or on the first error.
    pub async fn revalidate_all(
        &self,
        names: &BTreeSet<String>,
        height: u64,
    ) -> Result<RevalidationReport, IndexerError> {
        // Each task owns its name and revalidator handle so the combined
        // future stays `Send` for `tokio::spawn`.
        stream::iter(names.iter().cloned().map(Ok::<_, IndexerError>))
            .map_ok(|name| {
                let revalidator = self.clone();
                async move { revalidator.revalidate(&name, height).await }
            })
            .try_buffer_unordered(self.max_concurrent_names)
            .try_fold(RevalidationReport::default(), |acc, r| async move {
                Ok(acc.merge(r))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_merge_adds_fields() {
        let a = RevalidationReport {
            checked: 3,
            valid: 2,
            invalid: 1,
        };
        let b = RevalidationReport {
            checked: 1,
            valid: 0,
            invalid: 1,
        };
        assert_eq!(
            a.merge(b),
            RevalidationReport {
                checked: 4,
                valid: 2,
                invalid: 2,
            }
        );
    }
}
