mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use common::{
    CATALOG_URL, MockTransport, RecordingSleeper, catalog_transport, ok, page_body, page_of,
    recording, records,
};
use xeno_harvest::catalog::{PaginationStop, Paginator};
use xeno_harvest::domain::{Credential, SearchQuery};
use xeno_harvest::retry::{RetryPolicy, RetryingFetcher};
use xeno_harvest::transport::{Reply, TransportError};

const PAGE_DELAY: Duration = Duration::from_millis(500);

fn query() -> SearchQuery {
    SearchQuery {
        country: "India".to_string(),
        bbox: "21.5504,22.2017,88.2518,89.0905".parse().unwrap(),
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    }
}

fn ids(set: &xeno_harvest::catalog::RecordSet) -> Vec<String> {
    set.iter().map(|record| record.id.clone()).collect()
}

#[test]
fn walks_every_page_in_order() {
    let transport = catalog_transport(3, 10);
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();
    let paginator = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY);

    let set = paginator.retrieve(&query(), None);

    let expected: Vec<String> = (1..=30).map(|id| id.to_string()).collect();
    assert_eq!(ids(&set), expected);
    assert_eq!(set.pages_fetched, 3);
    assert_eq!(set.declared_total, Some(30));
    assert_eq!(set.stop, PaginationStop::Exhausted { pages: 3 });
    assert_eq!(transport.catalog_calls(), 3);
    assert_eq!(sleeper.slept(), vec![PAGE_DELAY, PAGE_DELAY]);
}

#[test]
fn requests_carry_query_key_and_page() {
    let transport = catalog_transport(2, 1);
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();
    Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("query=cnt%3AIndia%20box%3A21.5504%2C22.2017%2C88.2518%2C89.0905"));
    assert!(calls[0].contains("key=secret"));
    assert_eq!(page_of(&calls[0]), 1);
    assert_eq!(page_of(&calls[1]), 2);
}

#[test]
fn cap_truncates_on_the_last_needed_page() {
    let transport = catalog_transport(3, 10);
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();
    let paginator = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY);

    let set = paginator.retrieve(&query(), Some(25));

    let expected: Vec<String> = (1..=25).map(|id| id.to_string()).collect();
    assert_eq!(ids(&set), expected);
    assert_eq!(set.stop, PaginationStop::CapReached { cap: 25 });
    assert_eq!(transport.catalog_calls(), 3);
}

#[test]
fn cap_smaller_than_first_page_stops_after_one_request() {
    let transport = catalog_transport(3, 10);
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();
    let paginator = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY);

    let set = paginator.retrieve(&query(), Some(5));

    assert_eq!(set.len(), 5);
    assert_eq!(ids(&set), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(transport.catalog_calls(), 1);
    assert!(sleeper.slept().is_empty());
}

#[test]
fn empty_first_page_is_a_valid_empty_result() {
    let transport = MockTransport::new(|_| ok(page_body(&[], 0, 0)));
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert!(set.is_empty());
    assert_eq!(set.stop, PaginationStop::EmptyPage { page: 1 });
    assert!(!set.stop.is_partial());
}

#[test]
fn api_error_keeps_records_already_collected() {
    let transport = MockTransport::new(|url| {
        if page_of(url) == 1 {
            ok(page_body(&records(1, 10), 3, 30))
        } else {
            Ok(Reply {
                status: 401,
                body: br#"{"error":"client","message":"Invalid API key"}"#.to_vec(),
            })
        }
    });
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert_eq!(set.len(), 10);
    assert_matches!(
        set.stop,
        PaginationStop::ApiError { page: 2, ref message } if message == "Invalid API key"
    );
    assert!(set.stop.is_partial());
    assert_eq!(transport.calls().len(), 2);
}

#[test]
fn exhausted_retries_on_a_page_end_pagination() {
    let transport = MockTransport::new(|url| {
        if page_of(url) == 1 {
            ok(page_body(&records(1, 10), 2, 20))
        } else {
            Err(TransportError::Timeout("timed out".to_string()))
        }
    });
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert_eq!(set.len(), 10);
    assert_matches!(set.stop, PaginationStop::FetchFailed { page: 2, .. });
    // one page delay, then a single backoff between the two attempts on page 2
    assert_eq!(sleeper.slept(), vec![PAGE_DELAY, Duration::from_millis(1)]);
}

#[test]
fn unreadable_page_is_reported() {
    let transport = MockTransport::new(|_| ok("<html>maintenance</html>"));
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert!(set.is_empty());
    assert_matches!(set.stop, PaginationStop::InvalidResponse { page: 1, .. });
}

#[test]
fn species_summary_is_sorted_and_unique() {
    let transport = catalog_transport(1, 6);
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert_eq!(
        set.species(),
        vec![
            "Copsychus saularis (Oriental Magpie-Robin)",
            "Halcyon smyrnensis (White-throated Kingfisher)",
            "Pycnonotus cafer (Red-vented Bulbul)",
        ]
    );
}

#[test]
fn bad_entries_do_not_cost_the_rest_of_the_page() {
    let mut untitled = recording(2, "Pycnonotus", "cafer", "Red-vented Bulbul");
    untitled["en"] = json!(null);
    let body = serde_json::to_vec(&json!({
        "numRecordings": "3",
        "numPages": 2,
        "recordings": [
            recording(1, "Halcyon", "smyrnensis", "White-throated Kingfisher"),
            untitled,
            { "id": ["not", "an", "id"], "gen": "Copsychus" },
        ],
    }))
    .unwrap();
    let transport = MockTransport::new(move |url| {
        if page_of(url) == 1 {
            ok(body.clone())
        } else {
            ok(page_body(&records(4, 1), 2, 3))
        }
    });
    let sleeper = RecordingSleeper::default();
    let fetcher = RetryingFetcher::new(&transport, &sleeper, policy());
    let key = Credential::new("secret").unwrap();

    let set = Paginator::new(&fetcher, &key, CATALOG_URL, PAGE_DELAY).retrieve(&query(), None);

    assert_eq!(ids(&set), vec!["1", "2", "4"]);
    assert_eq!(set.records[1].common_name, "");
    assert_eq!(set.stop, PaginationStop::Exhausted { pages: 2 });
}
