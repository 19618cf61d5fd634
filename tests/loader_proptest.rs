use proptest::prelude::*;
use reviewdb::analytics::{YearCollector, YearInput};
use reviewdb::loader::load_reader;
use reviewdb::store::MemoryStore;

/// One input line: a valid review or some kind of junk.
fn line_strategy() -> impl Strategy<Value = (bool, String)> {
    prop_oneof![
        3 => ("[A-Z0-9]{1,10}", 1u8..=5).prop_map(|(asin, overall)| {
            (true, format!("{{\"asin\":\"{asin}\",\"overall\":{overall}.0}}"))
        }),
        1 => "#[a-z ]{0,20}".prop_map(|s| (false, s)),
        1 => Just((false, "{\"asin\":".to_string())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn inserted_plus_errors_equals_lines(
        lines in prop::collection::vec(line_strategy(), 0..60),
        batch_size in 1usize..12,
    ) {
        let input: String = lines.iter().map(|(_, l)| format!("{l}\n")).collect();
        let valid = lines.iter().filter(|(ok, _)| *ok).count();

        let mut store = MemoryStore::new();
        let report = load_reader(input.as_bytes(), &mut store, "reviews", batch_size).unwrap();

        prop_assert_eq!(report.lines_read as usize, lines.len());
        prop_assert_eq!(report.inserted + report.decode_errors, report.lines_read);
        prop_assert_eq!(report.inserted as usize, valid);

        let sizes = store.batch_sizes("reviews");
        prop_assert_eq!(sizes.len(), valid.div_ceil(batch_size));
        prop_assert!(sizes.iter().all(|&n| n >= 1 && n <= batch_size));
        if let Some((last, full)) = sizes.split_last() {
            prop_assert!(full.iter().all(|&n| n == batch_size));
            let expected_last = match valid % batch_size {
                0 => batch_size,
                rem => rem,
            };
            prop_assert_eq!(*last, expected_last);
        }
    }

    #[test]
    fn year_collector_never_exceeds_five_distinct(
        inputs in prop::collection::vec(
            prop_oneof![
                (1990i32..2000).prop_map(|y| y.to_string()),
                Just("abc".to_string()),
                Just(String::new()),
            ],
            0..30,
        )
    ) {
        let mut collector = YearCollector::new();
        for input in &inputs {
            if let YearInput::Finished = collector.feed(input) {
                break;
            }
        }
        let years = collector.finish();
        prop_assert!(years.len() <= 5);
        let mut deduped = years.clone();
        deduped.sort_unstable();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), years.len());
    }
}
