//! Read-side views over the offer corpus: filter facets, the multi-select
//! filter and the per-company summary. Everything here is a pure function of
//! the slice it is given; callers pass a fresh snapshot from the store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::Offer;

/// Rank given to duration labels outside the known table; sorts them last.
pub const UNRANKED_DURATION: u32 = 99;

/// Older spelling of "1 an". Still stored and matchable, never offered as a facet.
pub const LEGACY_YEAR_LABEL: &str = "12 mois";

pub fn duration_rank(label: &str) -> u32 {
    match label {
        "1 mois" => 1,
        "3 mois" => 3,
        "6 mois" => 6,
        "9 mois" => 9,
        "12 mois" | "1 an" => 12,
        "2 ans" => 24,
        _ => UNRANKED_DURATION,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub locations: Vec<String>,
    pub companies: Vec<String>,
    pub durations: Vec<String>,
}

/// Distinct non-empty values per filter dimension, taken from the whole corpus
/// so options stay visible even when the current selection hides them.
pub fn extract_facets(corpus: &[Offer]) -> Facets {
    let mut durations = distinct(
        corpus
            .iter()
            .map(|o| o.duration.as_str())
            .filter(|d| *d != LEGACY_YEAR_LABEL),
    );
    // Equal ranks fall back to alphabetical order.
    durations.sort_by(|a, b| {
        duration_rank(a)
            .cmp(&duration_rank(b))
            .then_with(|| a.cmp(b))
    });

    Facets {
        locations: distinct(corpus.iter().map(|o| o.location.as_str())),
        companies: distinct(corpus.iter().map(|o| o.company.as_str())),
        durations,
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Selected facet values. An empty list puts no constraint on its dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferFilter {
    pub locations: Vec<String>,
    pub durations: Vec<String>,
    pub companies: Vec<String>,
}

impl OfferFilter {
    /// Builds a filter from repeated `location` / `duration` / `company` query keys.
    /// Unknown keys are ignored and repeated values collapse to one.
    pub fn from_query_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let target = match key.as_str() {
                "location" => &mut filter.locations,
                "duration" => &mut filter.durations,
                "company" => &mut filter.companies,
                _ => continue,
            };
            if !target.contains(&value) {
                target.push(value);
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.durations.is_empty() && self.companies.is_empty()
    }

    /// AND across dimensions, OR within one.
    pub fn matches(&self, offer: &Offer) -> bool {
        selected(&self.locations, &offer.location)
            && selected(&self.durations, &offer.duration)
            && selected(&self.companies, &offer.company)
    }
}

fn selected(choices: &[String], value: &str) -> bool {
    choices.is_empty() || choices.iter().any(|c| c == value)
}

/// Newest first; equal timestamps fall back to the higher (later inserted) id.
pub fn sort_by_recency(offers: &mut [Offer]) {
    offers.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

pub fn filter_offers(corpus: &[Offer], filter: &OfferFilter) -> Vec<Offer> {
    let mut hits: Vec<Offer> = corpus
        .iter()
        .filter(|o| filter.matches(o))
        .cloned()
        .collect();
    sort_by_recency(&mut hits);
    // A record handed in twice sorts next to itself.
    hits.dedup_by_key(|o| o.id);
    hits
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanySummary {
    pub name: String,
    pub offer_count: usize,
    pub locations: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub latest_offer_at: OffsetDateTime,
}

/// Groups offers by exact company name, most recently active company first.
/// Companies whose latest offers share a timestamp are ordered by name.
pub fn aggregate_companies(corpus: &[Offer]) -> Vec<CompanySummary> {
    struct Group<'a> {
        count: usize,
        locations: BTreeSet<&'a str>,
        latest: OffsetDateTime,
    }

    let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();
    for offer in corpus {
        let group = groups.entry(offer.company.as_str()).or_insert(Group {
            count: 0,
            locations: BTreeSet::new(),
            latest: offer.created_at,
        });
        group.count += 1;
        group.locations.insert(offer.location.as_str());
        group.latest = group.latest.max(offer.created_at);
    }

    let mut summaries: Vec<CompanySummary> = groups
        .into_iter()
        .map(|(name, g)| CompanySummary {
            name: name.to_owned(),
            offer_count: g.count,
            locations: g.locations.into_iter().map(str::to_owned).collect(),
            latest_offer_at: g.latest,
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.latest_offer_at
            .cmp(&a.latest_offer_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    fn offer(id: i64, company: &str, location: &str, duration: &str, minutes: i64) -> Offer {
        Offer {
            id,
            title: format!("Intern #{}", id),
            company: company.into(),
            location: location.into(),
            duration: duration.into(),
            description: None,
            tags: None,
            created_at: datetime!(2025-01-01 00:00 UTC) + Duration::minutes(minutes),
            start_date: None,
            document_key: None,
            recruiter_id: 1,
        }
    }

    fn ids(offers: &[Offer]) -> Vec<i64> {
        offers.iter().map(|o| o.id).collect()
    }

    fn filter(locations: &[&str], durations: &[&str], companies: &[&str]) -> OfferFilter {
        let own = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
        OfferFilter {
            locations: own(locations),
            durations: own(durations),
            companies: own(companies),
        }
    }

    fn sample_corpus() -> Vec<Offer> {
        vec![
            offer(1, "Acme", "Tokyo", "3 mois", 10),
            offer(2, "Acme", "Osaka", "6 mois", 20),
            offer(3, "Zen", "Kyoto", "1 an", 30),
            offer(4, "Zen", "Tokyo", "12 mois", 40),
            offer(5, "Kumo", "Osaka", "3 mois", 50),
        ]
    }

    #[test]
    fn duration_rank_table() {
        assert_eq!(duration_rank("1 an"), 12);
        assert_eq!(duration_rank("12 mois"), 12);
        assert_eq!(duration_rank("3 mois"), 3);
        assert_eq!(duration_rank("2 ans"), 24);
        assert_eq!(duration_rank("unknown"), UNRANKED_DURATION);
        assert_eq!(duration_rank(""), 99);
    }

    #[test]
    fn facets_are_sorted_distinct_and_hide_legacy_label() {
        let facets = extract_facets(&sample_corpus());
        assert_eq!(facets.locations, vec!["Kyoto", "Osaka", "Tokyo"]);
        assert_eq!(facets.companies, vec!["Acme", "Kumo", "Zen"]);
        assert_eq!(facets.durations, vec!["3 mois", "6 mois", "1 an"]);
    }

    #[test]
    fn facets_skip_empty_values() {
        let corpus = vec![offer(1, "", "", "", 0), offer(2, "Acme", "Tokyo", "3 mois", 1)];
        let facets = extract_facets(&corpus);
        assert_eq!(facets.locations, vec!["Tokyo"]);
        assert_eq!(facets.companies, vec!["Acme"]);
        assert_eq!(facets.durations, vec!["3 mois"]);
    }

    #[test]
    fn unknown_durations_sort_last_alphabetically() {
        let corpus = vec![
            offer(1, "A", "X", "stage court", 0),
            offer(2, "A", "X", "2 ans", 0),
            offer(3, "A", "X", "alternance", 0),
            offer(4, "A", "X", "1 mois", 0),
        ];
        assert_eq!(
            extract_facets(&corpus).durations,
            vec!["1 mois", "2 ans", "alternance", "stage court"]
        );
    }

    #[test]
    fn empty_corpus_degrades_to_empty_outputs() {
        assert_eq!(extract_facets(&[]), Facets::default());
        assert!(filter_offers(&[], &filter(&["Tokyo"], &[], &[])).is_empty());
        assert!(filter_offers(&[], &OfferFilter::default()).is_empty());
        assert!(aggregate_companies(&[]).is_empty());
    }

    #[test]
    fn no_selection_returns_everything_newest_first() {
        let corpus = sample_corpus();
        let result = filter_offers(&corpus, &OfferFilter::default());
        assert_eq!(ids(&result), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn two_offer_scenario() {
        let corpus = vec![
            offer(1, "A", "Tokyo", "3 mois", 0),
            offer(2, "B", "Osaka", "1 an", 5),
        ];
        assert_eq!(ids(&filter_offers(&corpus, &filter(&["Tokyo"], &[], &[]))), vec![1]);
        assert_eq!(ids(&filter_offers(&corpus, &OfferFilter::default())), vec![2, 1]);
    }

    #[test]
    fn or_within_dimension_and_across_dimensions() {
        let corpus = sample_corpus();

        let either_city = filter_offers(&corpus, &filter(&["Tokyo", "Osaka"], &[], &[]));
        assert_eq!(ids(&either_city), vec![5, 4, 2, 1]);

        let narrowed = filter_offers(&corpus, &filter(&["Tokyo", "Osaka"], &["3 mois"], &["Acme"]));
        assert_eq!(ids(&narrowed), vec![1]);

        for o in &either_city {
            assert!(o.location == "Tokyo" || o.location == "Osaka");
        }
    }

    #[test]
    fn legacy_label_still_matches_when_selected() {
        let result = filter_offers(&sample_corpus(), &filter(&[], &["12 mois"], &[]));
        assert_eq!(ids(&result), vec![4]);
    }

    #[test]
    fn values_outside_the_corpus_match_nothing() {
        let result = filter_offers(&sample_corpus(), &filter(&["Paris"], &[], &[]));
        assert!(result.is_empty());
    }

    #[test]
    fn filtering_is_idempotent_and_leaves_input_alone() {
        let corpus = sample_corpus();
        let before = corpus.clone();
        let f = filter(&["Tokyo", "Kyoto"], &[], &[]);
        let once = filter_offers(&corpus, &f);
        let twice = filter_offers(&once, &f);
        assert_eq!(once, twice);
        assert_eq!(corpus, before);
    }

    #[test]
    fn equal_timestamps_break_ties_on_id() {
        let corpus = vec![
            offer(7, "A", "Tokyo", "3 mois", 0),
            offer(9, "A", "Tokyo", "3 mois", 0),
            offer(8, "A", "Tokyo", "3 mois", 0),
        ];
        assert_eq!(ids(&filter_offers(&corpus, &OfferFilter::default())), vec![9, 8, 7]);
    }

    #[test]
    fn duplicate_records_appear_once() {
        let a = offer(1, "A", "Tokyo", "3 mois", 0);
        let corpus = vec![a.clone(), offer(2, "B", "Osaka", "1 an", 1), a];
        assert_eq!(ids(&filter_offers(&corpus, &OfferFilter::default())), vec![2, 1]);
    }

    #[test]
    fn query_pairs_build_a_filter() {
        let pairs = vec![
            ("location".to_string(), "Tokyo".to_string()),
            ("page".to_string(), "2".to_string()),
            ("location".to_string(), "Osaka".to_string()),
            ("location".to_string(), "Tokyo".to_string()),
            ("company".to_string(), "Acme".to_string()),
        ];
        let f = OfferFilter::from_query_pairs(pairs);
        assert_eq!(f, filter(&["Tokyo", "Osaka"], &[], &["Acme"]));
        assert!(!f.is_empty());
        assert!(OfferFilter::from_query_pairs(Vec::new()).is_empty());
    }

    #[test]
    fn company_aggregation_counts_and_orders() {
        let corpus = vec![
            offer(1, "Acme", "Tokyo", "3 mois", 0),
            offer(2, "Acme", "Tokyo", "6 mois", 10),
            offer(3, "Acme", "Osaka", "1 an", 20),
            offer(4, "Zen", "Kyoto", "3 mois", 30),
            offer(5, "Zen", "Kyoto", "6 mois", 5),
        ];
        let summaries = aggregate_companies(&corpus);
        assert_eq!(summaries.len(), 2);

        assert_eq!(summaries[0].name, "Zen");
        assert_eq!(summaries[0].offer_count, 2);
        assert_eq!(summaries[0].locations, vec!["Kyoto"]);
        assert_eq!(summaries[0].latest_offer_at, corpus[3].created_at);

        let acme = &summaries[1];
        assert_eq!(acme.offer_count, 3);
        assert_eq!(acme.locations, vec!["Osaka", "Tokyo"]);
        assert_eq!(acme.latest_offer_at, corpus[2].created_at);
    }

    #[test]
    fn company_names_are_case_sensitive_and_ties_sort_by_name() {
        let corpus = vec![
            offer(1, "acme", "Tokyo", "3 mois", 0),
            offer(2, "Acme", "Tokyo", "3 mois", 0),
            offer(3, "Beta", "Tokyo", "3 mois", 0),
        ];
        let names: Vec<_> = aggregate_companies(&corpus)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Beta", "acme"]);
    }

    mod properties {
        use std::collections::BTreeSet;

        use proptest::prelude::*;
        use proptest::sample::{select, subsequence};

        use super::*;

        const LOCATIONS: &[&str] = &["Tokyo", "Osaka", "Kyoto", ""];
        const COMPANIES: &[&str] = &["Acme", "Zen", "acme", ""];
        const DURATIONS: &[&str] = &["1 mois", "3 mois", "6 mois", "1 an", "12 mois", "18 mois", ""];

        // Few distinct minutes so timestamp ties are common.
        fn arb_corpus() -> impl Strategy<Value = Vec<Offer>> {
            prop::collection::vec(
                (select(LOCATIONS), select(COMPANIES), select(DURATIONS), 0i64..4),
                0..24,
            )
            .prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (location, company, duration, minutes))| {
                        offer(i as i64 + 1, company, location, duration, minutes)
                    })
                    .collect()
            })
        }

        fn arb_choices(pool: &'static [&'static str]) -> impl Strategy<Value = Vec<String>> {
            subsequence(pool, 0..=2).prop_map(|v| v.into_iter().map(str::to_owned).collect())
        }

        fn arb_filter() -> impl Strategy<Value = OfferFilter> {
            (
                arb_choices(LOCATIONS),
                arb_choices(DURATIONS),
                arb_choices(COMPANIES),
            )
                .prop_map(|(locations, durations, companies)| OfferFilter {
                    locations,
                    durations,
                    companies,
                })
        }

        fn newest_first(offers: &[Offer]) -> bool {
            offers
                .windows(2)
                .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id))
        }

        proptest! {
            #[test]
            fn empty_filter_returns_the_whole_corpus(corpus in arb_corpus()) {
                let hits = filter_offers(&corpus, &OfferFilter::default());
                let mut got = ids(&hits);
                got.sort_unstable();
                let mut want = ids(&corpus);
                want.sort_unstable();
                prop_assert_eq!(got, want);
                prop_assert!(newest_first(&hits));
            }

            #[test]
            fn results_are_exactly_the_matching_offers(
                corpus in arb_corpus(),
                filter in arb_filter(),
            ) {
                let hits = filter_offers(&corpus, &filter);
                for o in &hits {
                    prop_assert!(filter.locations.is_empty() || filter.locations.contains(&o.location));
                    prop_assert!(filter.durations.is_empty() || filter.durations.contains(&o.duration));
                    prop_assert!(filter.companies.is_empty() || filter.companies.contains(&o.company));
                }
                let expected = corpus.iter().filter(|o| filter.matches(o)).count();
                prop_assert_eq!(hits.len(), expected);
                prop_assert!(newest_first(&hits));
            }

            #[test]
            fn filtering_is_idempotent(corpus in arb_corpus(), filter in arb_filter()) {
                let once = filter_offers(&corpus, &filter);
                let twice = filter_offers(&once, &filter);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn facets_are_distinct_non_empty_corpus_values(corpus in arb_corpus()) {
                let facets = extract_facets(&corpus);
                for (values, field) in [
                    (&facets.locations, "location"),
                    (&facets.companies, "company"),
                    (&facets.durations, "duration"),
                ] {
                    let unique: BTreeSet<&String> = values.iter().collect();
                    prop_assert_eq!(unique.len(), values.len(), "duplicate {}", field);
                    prop_assert!(values.iter().all(|v| !v.is_empty()), "empty {}", field);
                }
                prop_assert!(facets.locations.iter().all(|l| corpus.iter().any(|o| &o.location == l)));
                prop_assert!(!facets.durations.iter().any(|d| d == LEGACY_YEAR_LABEL));
                prop_assert!(facets
                    .durations
                    .windows(2)
                    .all(|w| duration_rank(&w[0]) <= duration_rank(&w[1])));
            }
        }
    }
}
