//! Lookup/match
//!
//! Finds the best existing entry for a request among the stored variants
//! under its cache key. Index failures of any kind collapse to a cache miss;
//! the request path never sees a lookup error. Selection is a linear scan in
//! store order: the first record whose policy satisfies the request wins,
//! with no freshness or recency tie-break.

use std::sync::Arc;

use http::Request;

use crate::config::CacheOptions;
use crate::entry::CacheEntry;
use crate::key::cache_key;
use crate::policy::PolicyProvider;
use crate::store::{RecordMatcher, Store, StoredRecord};

/// Find a stored entry able to satisfy `request`, or `None` on a miss.
pub async fn find(
    request: &Request<()>,
    store: &Arc<dyn Store>,
    policies: &Arc<dyn PolicyProvider>,
    options: &CacheOptions,
) -> Option<CacheEntry> {
    let key = cache_key(request);

    let matcher: RecordMatcher = {
        let policies = Arc::clone(policies);
        let options = options.clone();
        Box::new(move |a, b| records_match(a, b, policies.as_ref(), &options))
    };

    let records = match store.compact(&key, matcher).await {
        Ok(records) => records,
        Err(err) => {
            tracing::debug!(
                target: "stash_cache::lookup",
                key = %key,
                error = %err,
                "index compaction failed; treating as cache miss"
            );
            return None;
        }
    };

    for record in records {
        let entry = CacheEntry::from_record(
            record,
            Arc::clone(store),
            Arc::clone(policies),
            options.clone(),
        );
        match entry.policy() {
            Ok(policy) if policy.satisfies(request) => return Some(entry),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    target: "stash_cache::lookup",
                    key = %key,
                    error = %err,
                    "skipping record with unusable metadata"
                );
            }
        }
    }

    None
}

/// Two records are equivalent iff the policy built from the first considers
/// the request reconstructed from the second satisfiable by the first's
/// response. Unreconstructable records never match anything.
fn records_match(
    a: &StoredRecord,
    b: &StoredRecord,
    policies: &dyn PolicyProvider,
    options: &CacheOptions,
) -> bool {
    let Ok(request_a) = a.metadata.rebuild_request() else {
        return false;
    };
    let Ok(response_a) = a.metadata.rebuild_response_head(a.size) else {
        return false;
    };
    let Ok(request_b) = b.metadata.rebuild_request() else {
        return false;
    };
    policies
        .build(&request_a, &response_a, options)
        .satisfies(&request_b)
}
