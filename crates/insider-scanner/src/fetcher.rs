//! Cache-aware fill fetching: serve from the store, fetch only coverage
//! gaps, and return a single consistent view.

use chrono::{DateTime, Utc};
use polymarket_core::api::subgraph::PAGE_SIZE;
use polymarket_core::api::SubgraphClient;
use polymarket_core::db::{MarketFillQuery, MarketSyncUpdate, Store};
use polymarket_core::types::{Fill, MarketSync};
use polymarket_core::Result;
use tracing::{debug, info, warn};

/// Why a delta fetch is (or is not) needed for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageReason {
    /// No watermarks at all; fetch the whole requested range.
    Missing,
    /// Requested range extends past the upper watermark.
    PartialNewer,
    /// Requested range starts before the lower watermark and history is
    /// not known-complete.
    PartialOlder,
    /// Coverage exists but the last sync is old and the request is
    /// open-ended.
    Stale,
}

/// One contiguous range the indexer still needs to provide. Bounds are
/// inclusive; `None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchDelta {
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub reason: CoverageReason,
}

/// A (token, time-range) request.
#[derive(Debug, Clone, Default)]
pub struct FillRequest {
    pub token_id: String,
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

/// The assembled response. `fills` always comes from the store read-back,
/// so callers see store order regardless of which portion was fetched.
#[derive(Debug)]
pub struct FillResponse {
    pub fills: Vec<Fill>,
    /// Fill rows newly written by this request.
    pub fetched: u64,
    pub deltas: Vec<FetchDelta>,
    /// Set when a delta fetch failed and the response fell back to cached
    /// coverage only. Watermarks were not advanced for the failed range.
    pub degraded: bool,
}

/// Decide which ranges a request must fetch, given current watermarks.
///
/// Both-sided gaps produce two deltas: one `partial-newer` and one
/// `partial-older`.
pub fn plan_coverage(
    sync: &MarketSync,
    after: Option<i64>,
    before: Option<i64>,
    staleness_secs: i64,
    now: DateTime<Utc>,
) -> Vec<FetchDelta> {
    if sync.is_empty() {
        return vec![FetchDelta {
            after,
            before,
            reason: CoverageReason::Missing,
        }];
    }
    let synced_from = sync.synced_from.expect("checked non-empty");
    let synced_to = sync.synced_to.expect("checked non-empty");

    let mut deltas = Vec::new();

    // Newer gap: the request reaches past the covered upper bound.
    if before.is_some_and(|hi| hi > synced_to) {
        deltas.push(FetchDelta {
            after: Some(synced_to + 1),
            before,
            reason: CoverageReason::PartialNewer,
        });
    }

    // Older gap: the request reaches before the covered lower bound and
    // there is older history left to find.
    if !sync.has_complete_history && after.map_or(true, |lo| lo < synced_from) {
        deltas.push(FetchDelta {
            after,
            before: Some(synced_from - 1),
            reason: CoverageReason::PartialOlder,
        });
    }

    // Stale refresh: fully covered, but the coverage was stamped long
    // enough ago that an open-ended request re-checks the head.
    if deltas.is_empty() && before.is_none() {
        let age = sync
            .synced_at
            .map(|at| (now - at).num_seconds())
            .unwrap_or(i64::MAX);
        if age > staleness_secs {
            deltas.push(FetchDelta {
                after: Some(synced_to + 1),
                before: None,
                reason: CoverageReason::Stale,
            });
        }
    }

    deltas
}

/// Watermark advancement for a fetched delta. The requested bounds define
/// the newly verified coverage; observed fill timestamps stand in where a
/// bound was open.
pub fn delta_sync_update(
    delta: &FetchDelta,
    fills: &[Fill],
    now: DateTime<Utc>,
    complete: bool,
) -> MarketSyncUpdate {
    let min_fill_ts = fills.iter().map(|f| f.timestamp).min();
    let max_fill_ts = fills.iter().map(|f| f.timestamp).max();

    let hi = delta.before.or(Some(now.timestamp()));
    let lo = delta.after.or(min_fill_ts).or(hi);

    MarketSyncUpdate {
        synced_from: lo,
        synced_to: hi.or(max_fill_ts),
        has_complete_history: complete.then_some(true),
    }
}

pub struct FillFetcher<'a> {
    store: &'a Store,
    subgraph: &'a SubgraphClient,
    staleness_secs: i64,
}

impl<'a> FillFetcher<'a> {
    pub fn new(store: &'a Store, subgraph: &'a SubgraphClient, staleness_secs: i64) -> Self {
        Self {
            store,
            subgraph,
            staleness_secs,
        }
    }

    /// Satisfy a fill request, fetching only uncovered ranges. The result
    /// is always read back from the store with the original filters.
    pub async fn fetch(&self, request: &FillRequest) -> Result<FillResponse> {
        let sync = self.store.get_market_sync(&request.token_id).await?;
        let now = Utc::now();
        let deltas = plan_coverage(&sync, request.after, request.before, self.staleness_secs, now);

        let mut fetched = 0;
        let mut degraded = false;

        for delta in &deltas {
            debug!(
                token_id = %request.token_id,
                reason = ?delta.reason,
                after = ?delta.after,
                before = ?delta.before,
                "fetching coverage delta"
            );
            match self
                .subgraph
                .fetch_fills(&request.token_id, delta.after, delta.before, None)
                .await
            {
                Ok(fills) => {
                    // Reaching the open lower end means the token's first
                    // fill was found: the oldest page came back short.
                    let complete = delta.after.is_none() && fills.len() < PAGE_SIZE;
                    let update = delta_sync_update(delta, &fills, now, complete);
                    let inserted = self
                        .store
                        .save_fills_and_sync(&request.token_id, &fills, update)
                        .await?;
                    fetched += inserted;
                    info!(
                        token_id = %request.token_id,
                        reason = ?delta.reason,
                        inserted,
                        "persisted coverage delta"
                    );
                }
                Err(err) => {
                    // Best effort: cached data still answers; the failed
                    // range stays unsynced for the next request.
                    warn!(
                        token_id = %request.token_id,
                        reason = ?delta.reason,
                        error = %err,
                        "delta fetch failed; serving cached coverage"
                    );
                    degraded = true;
                }
            }
        }

        let fills = self
            .store
            .get_fills_for_market(
                &request.token_id,
                MarketFillQuery {
                    after: request.after,
                    before: request.before,
                    limit: request.limit,
                },
            )
            .await?;

        Ok(FillResponse {
            fills,
            fetched,
            deltas,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::types::Side;

    const JAN_1: i64 = 1_704_067_200;
    const JAN_5: i64 = 1_704_412_800;
    const JAN_20: i64 = 1_705_708_800;
    const JAN_31: i64 = 1_706_659_200;

    fn synced(from: i64, to: i64, complete: bool) -> MarketSync {
        MarketSync {
            synced_from: Some(from),
            synced_to: Some(to),
            synced_at: Some(Utc::now()),
            has_complete_history: complete,
        }
    }

    #[test]
    fn test_empty_coverage_fetches_everything() {
        let deltas = plan_coverage(
            &MarketSync::default(),
            Some(JAN_1),
            Some(JAN_31),
            300,
            Utc::now(),
        );
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].reason, CoverageReason::Missing);
        assert_eq!(deltas[0].after, Some(JAN_1));
        assert_eq!(deltas[0].before, Some(JAN_31));
    }

    #[test]
    fn test_straddling_request_produces_both_gap_deltas() {
        // Watermarks [Jan 5, Jan 20], request [Jan 1, Jan 31]: fetch the
        // newer gap and the older gap, nothing in between.
        let deltas = plan_coverage(
            &synced(JAN_5, JAN_20, false),
            Some(JAN_1),
            Some(JAN_31),
            300,
            Utc::now(),
        );
        assert_eq!(deltas.len(), 2);

        let newer = deltas
            .iter()
            .find(|d| d.reason == CoverageReason::PartialNewer)
            .unwrap();
        assert_eq!(newer.after, Some(JAN_20 + 1));
        assert_eq!(newer.before, Some(JAN_31));

        let older = deltas
            .iter()
            .find(|d| d.reason == CoverageReason::PartialOlder)
            .unwrap();
        assert_eq!(older.after, Some(JAN_1));
        assert_eq!(older.before, Some(JAN_5 - 1));
    }

    #[test]
    fn test_covered_request_needs_no_fetch() {
        let deltas = plan_coverage(
            &synced(JAN_1, JAN_31, false),
            Some(JAN_5),
            Some(JAN_20),
            300,
            Utc::now(),
        );
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_complete_history_suppresses_older_gap() {
        let deltas = plan_coverage(
            &synced(JAN_5, JAN_31, true),
            Some(JAN_1),
            Some(JAN_20),
            300,
            Utc::now(),
        );
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_stale_open_ended_request_refreshes_head() {
        let mut sync = synced(JAN_1, JAN_20, true);
        sync.synced_at = Some(Utc::now() - chrono::Duration::seconds(900));

        let deltas = plan_coverage(&sync, Some(JAN_1), None, 300, Utc::now());
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].reason, CoverageReason::Stale);
        assert_eq!(deltas[0].after, Some(JAN_20 + 1));
        assert_eq!(deltas[0].before, None);

        // A bounded request never goes stale.
        sync.synced_at = Some(Utc::now() - chrono::Duration::seconds(900));
        let bounded = plan_coverage(&sync, Some(JAN_1), Some(JAN_20), 300, Utc::now());
        assert!(bounded.is_empty());
    }

    #[test]
    fn test_fresh_open_ended_request_stays_cached() {
        let sync = synced(JAN_1, JAN_20, true);
        let deltas = plan_coverage(&sync, Some(JAN_1), None, 300, Utc::now());
        assert!(deltas.is_empty());
    }

    fn fill(id: &str, ts: i64) -> Fill {
        Fill {
            id: id.into(),
            transaction_hash: format!("0xtx-{id}"),
            timestamp: ts,
            order_hash: "0xord".into(),
            side: Side::Sell,
            size: 1_000_000,
            price: 500_000,
            maker: "0xm".into(),
            taker: "0xt".into(),
            token_id: "tok".into(),
        }
    }

    #[test]
    fn test_delta_update_uses_requested_bounds() {
        let delta = FetchDelta {
            after: Some(JAN_1),
            before: Some(JAN_31),
            reason: CoverageReason::Missing,
        };
        // Fills only cover part of the range; the verified coverage is
        // still the whole requested window.
        let fills = vec![fill("a", JAN_5), fill("b", JAN_20)];
        let update = delta_sync_update(&delta, &fills, Utc::now(), false);
        assert_eq!(update.synced_from, Some(JAN_1));
        assert_eq!(update.synced_to, Some(JAN_31));
        assert_eq!(update.has_complete_history, None);
    }

    #[test]
    fn test_delta_update_open_bounds_fall_back_to_observations() {
        let now = Utc::now();
        let delta = FetchDelta {
            after: None,
            before: None,
            reason: CoverageReason::Missing,
        };
        let fills = vec![fill("a", JAN_5), fill("b", JAN_20)];
        let update = delta_sync_update(&delta, &fills, now, true);
        assert_eq!(update.synced_from, Some(JAN_5));
        assert_eq!(update.synced_to, Some(now.timestamp()));
        assert_eq!(update.has_complete_history, Some(true));
    }

    #[tokio::test]
    async fn test_watermarks_widen_through_persisted_deltas() {
        // Scenario: two gap deltas persisted around existing coverage
        // leave the final watermark spanning the full request.
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();

        store
            .save_fills_and_sync(
                "tok",
                &[fill("mid", JAN_5 + 60)],
                MarketSyncUpdate {
                    synced_from: Some(JAN_5),
                    synced_to: Some(JAN_20),
                    has_complete_history: None,
                },
            )
            .await
            .unwrap();

        let older = FetchDelta {
            after: Some(JAN_1),
            before: Some(JAN_5 - 1),
            reason: CoverageReason::PartialOlder,
        };
        let older_fills = vec![fill("old", JAN_1 + 120)];
        store
            .save_fills_and_sync(
                "tok",
                &older_fills,
                delta_sync_update(&older, &older_fills, now, false),
            )
            .await
            .unwrap();

        let newer = FetchDelta {
            after: Some(JAN_20 + 1),
            before: Some(JAN_31),
            reason: CoverageReason::PartialNewer,
        };
        let newer_fills = vec![fill("new", JAN_31 - 120)];
        store
            .save_fills_and_sync(
                "tok",
                &newer_fills,
                delta_sync_update(&newer, &newer_fills, now, false),
            )
            .await
            .unwrap();

        let sync = store.get_market_sync("tok").await.unwrap();
        assert_eq!(sync.synced_from, Some(JAN_1));
        assert_eq!(sync.synced_to, Some(JAN_31));

        // The read-back sees all three fills in store order.
        let fills = store
            .get_fills_for_market("tok", MarketFillQuery::default())
            .await
            .unwrap();
        assert_eq!(fills.len(), 3);
        assert!(fills.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}
