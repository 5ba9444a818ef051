use people_etl::normalize::{normalize_city, normalize_name};
use people_etl::pipeline::run_records;
use people_etl::record::{AGE_FIELD, CITY_FIELD, NAME_FIELD, RawRecord};
use people_etl::store::Store;
use people_etl::transform::transform_batch;
use proptest::prelude::*;

fn raw_field() -> impl Strategy<Value = Option<Option<String>>> {
    prop_oneof![
        Just(None),
        Just(Some(None)),
        "[ a-zA-Z]{0,12}".prop_map(|s| Some(Some(s))),
        "-?[0-9]{1,3}".prop_map(|s| Some(Some(s))),
        any::<String>().prop_map(|s| Some(Some(s))),
    ]
}

fn raw_record() -> impl Strategy<Value = RawRecord> {
    (raw_field(), raw_field(), raw_field()).prop_map(|(name, age, city)| {
        let mut raw = RawRecord::new();
        for (key, value) in [(NAME_FIELD, name), (AGE_FIELD, age), (CITY_FIELD, city)] {
            if let Some(value) = value {
                raw.insert(key, value);
            }
        }
        raw
    })
}

fn person_record() -> impl Strategy<Value = RawRecord> {
    ("[a-z]{1,6}", 0i64..90, prop::sample::select(vec!["san luis", "LEÓN", " san juan"]))
        .prop_map(|(name, age, city)| {
            RawRecord::from_pairs([
                (NAME_FIELD, name),
                (AGE_FIELD, age.to_string()),
                (CITY_FIELD, city.to_string()),
            ])
        })
}

proptest! {
    #[test]
    fn every_row_lands_on_exactly_one_side(
        records in prop::collection::vec(raw_record(), 0..40),
        min_age in 0i64..60,
    ) {
        let outcome = transform_batch(&records, min_age);
        prop_assert_eq!(outcome.valid.len() + outcome.rejected.len(), records.len());
        prop_assert!(outcome.valid.iter().all(|r| r.age >= min_age));
    }

    #[test]
    fn normalization_is_idempotent(text in "[ a-zA-ZáéíóúÁÉÍÓÚñÑ]{0,20}") {
        let name = normalize_name(&text).unwrap();
        prop_assert_eq!(normalize_name(&name).unwrap(), name.clone());
        let city = normalize_city(&text).unwrap();
        prop_assert_eq!(normalize_city(&city).unwrap(), city);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reloading_any_batch_inserts_nothing(
        records in prop::collection::vec(person_record(), 0..25),
    ) {
        let mut store = Store::open_in_memory().unwrap();
        let first = run_records(&mut store, "first.csv", &records, 25).unwrap();
        let second = run_records(&mut store, "second.csv", &records, 25).unwrap();

        prop_assert_eq!(second.summary.inserted_new, 0);
        prop_assert_eq!(second.summary.ignored_duplicates, first.summary.valid_count);

        let duplicates: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM (SELECT 1 FROM personas_limpias
                 GROUP BY nombre, edad, ciudad_id HAVING COUNT(*) > 1)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        prop_assert_eq!(duplicates, 0);
    }
}
