//! Behavior of the in-memory predicate evaluator.

use quarry::{make_filter, parse_date_literal, FilterConfig, FixedClock, Map, Pattern, QueryError, Timestamp, Value};
use serde::Serialize;
use serde_json::{json, Value as Json};

fn check(query: Json, record: Json) -> bool {
    try_check(query, record).unwrap()
}

fn try_check(query: Json, record: Json) -> Result<bool, QueryError> {
    make_filter(&Value::from(query), FilterConfig::default())?.matches(&Value::from(record))
}

fn at(literal: &str) -> Timestamp {
    Timestamp::from(parse_date_literal(literal).unwrap())
}

fn clock_at(literal: &str) -> FilterConfig {
    FilterConfig::new().with_clock(FixedClock(at(literal)))
}

fn dated(field: &str, when: Timestamp) -> Value {
    let mut record = Map::new();
    record.insert(field.to_string(), Value::Temporal(when));
    Value::Record(record)
}

const JAX_DOWNTOWN: [f64; 2] = [-81.655647, 30.332184];
const JAX_BEACH: [f64; 2] = [-81.3961, 30.2841];
const BERMUDA: [f64; 2] = [71.0, 25.0];

fn near(origin: Json, options: Json, location: Json) -> Result<bool, QueryError> {
    let mut condition = json!({ "$near": origin });
    for (key, value) in options.as_object().unwrap() {
        condition[key] = value.clone();
    }
    try_check(json!({ "location": condition }), json!({ "location": location }))
}

// ============================================================================
// Equality
// ============================================================================

#[test]
fn eq_with_scalars_and_arrays() {
    assert!(check(json!({ "name": "Ravel" }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": "Ravel" }), json!({ "name": "Debussy" })));
    assert!(check(json!({ "works": { "$eq": "Bolero" } }), json!({ "works": ["La Valse", "Bolero"] })));
    assert!(!check(json!({ "works": { "$eq": "Bolero" } }), json!({ "works": [] })));
    assert!(check(json!({ "works": { "$ne": "Bolero" } }), json!({ "works": [] })));
    assert!(!check(json!({ "works": { "$ne": "Bolero" } }), json!({ "works": ["Bolero"] })));
}

#[test]
fn eq_matches_a_whole_array() {
    assert!(check(json!({ "keys": ["C", "D"] }), json!({ "keys": ["C", "D"] })));
    assert!(!check(json!({ "keys": ["C", "D"] }), json!({ "keys": ["D", "C"] })));
}

#[test]
fn eq_coerces_numbers_and_strings() {
    assert!(check(json!({ "opus": 23 }), json!({ "opus": "23" })));
    assert!(check(json!({ "opus": "23" }), json!({ "opus": 23 })));
    assert!(!check(json!({ "opus": "24" }), json!({ "opus": 23 })));
}

#[test]
fn eq_refuses_boolean_coercion() {
    let err = try_check(json!({ "published": { "$eq": 1 } }), json!({ "published": true })).unwrap_err();
    assert!(matches!(err, QueryError::CoercionFailure { ref field, .. } if field == "published"));
    assert!(try_check(json!({ "published": { "$eq": "true" } }), json!({ "published": true })).is_err());
    assert!(try_check(json!({ "published": { "$eq": "false" } }), json!({ "published": false })).is_err());
    assert!(check(json!({ "published": false }), json!({ "published": false })));
}

#[test]
fn null_equals_only_null() {
    assert!(check(json!({ "nickname": null }), json!({ "nickname": null })));
    assert!(!check(json!({ "nickname": null }), json!({ "nickname": "Claude" })));
}

// ============================================================================
// Text
// ============================================================================

#[test]
fn regex_with_options() {
    assert!(check(json!({ "name": { "$regex": "^Rav" } }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": { "$regex": "^rav" } }), json!({ "name": "Ravel" })));
    assert!(check(
        json!({ "name": { "$regex": "^rav", "$options": "i" } }),
        json!({ "name": "Ravel" })
    ));
}

#[test]
fn regex_pattern_values() {
    let query = |pattern: Pattern| {
        let mut query = Map::new();
        query.insert("name".into(), Value::Pattern(pattern));
        make_filter(&Value::Record(query), FilterConfig::default()).unwrap()
    };
    let record = Value::from(json!({ "name": "Maurice Ravel" }));

    assert!(query(Pattern::new("Ravel$")).matches(&record).unwrap());
    assert!(!query(Pattern::new("ravel$")).matches(&record).unwrap());
    assert!(query(Pattern::with_flags("ravel$", "i")).matches(&record).unwrap());
}

#[test]
fn invalid_regex_fails_to_compile() {
    let err = make_filter(&Value::from(json!({ "name": { "$regex": "(" } })), FilterConfig::default()).unwrap_err();
    assert!(matches!(err, QueryError::InvalidRegex(_)));
}

#[test]
fn like_wildcards() {
    assert!(check(json!({ "name": { "$like": "Ravel" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$like": " Ravel" } }), json!({ "name": "Ravel " })));
    assert!(check(json!({ "name": { "$like": "Rav?l" } }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": { "$like": "Rav?" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$like": "Ra*" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$like": "%vel" } }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": { "$like": "Rav" } }), json!({ "name": "Ravel" })));
}

#[test]
fn like_case_sensitivity() {
    assert!(!check(json!({ "name": { "$like": "ravel" } }), json!({ "name": "Ravel" })));
    assert!(check(
        json!({ "name": { "$like": "ravel", "$caseInsensitive": true } }),
        json!({ "name": "Ravel" })
    ));
    assert!(!check(
        json!({ "name": { "$like": "ravel", "$caseInsensitive": false } }),
        json!({ "name": "Ravel" })
    ));
}

#[test]
fn unlike_negates_like() {
    assert!(!check(json!({ "name": { "$unlike": "Ra*" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$unlike": "De*" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$unlike": "De*" } }), json!({})));
}

#[test]
fn includes_and_excludes() {
    assert!(check(json!({ "name": { "$includes": "ave" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$includes": " vel" } }), json!({ "name": "Ravel " })));
    assert!(!check(json!({ "name": { "$includes": "AVE" } }), json!({ "name": "Ravel" })));
    assert!(check(
        json!({ "name": { "$includes": "AVE", "$caseInsensitive": true } }),
        json!({ "name": "Ravel" })
    ));
    assert!(!check(json!({ "name": { "$excludes": "ave" } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$excludes": "bus" } }), json!({ "name": "Ravel" })));
}

#[test]
fn prefix_trims_both_sides() {
    assert!(check(json!({ "name": { "$prefix": "Maurice" } }), json!({ "name": " Maurice Ravel " })));
    assert!(check(json!({ "name": { "$prefix": " Maurice " } }), json!({ "name": "Maurice Ravel" })));
    assert!(!check(json!({ "name": { "$prefix": "maurice" } }), json!({ "name": "Maurice Ravel" })));
    assert!(check(
        json!({ "name": { "$prefix": "maurice", "$caseInsensitive": true } }),
        json!({ "name": "Maurice Ravel" })
    ));
}

// ============================================================================
// Presence and membership
// ============================================================================

#[test]
fn exists() {
    assert!(check(json!({ "opus": { "$exists": true } }), json!({ "opus": 23 })));
    assert!(!check(json!({ "opus": { "$exists": true } }), json!({})));
    assert!(check(json!({ "opus": { "$exists": false } }), json!({})));
    assert!(!check(json!({ "opus": { "$exists": false } }), json!({ "opus": 23 })));
}

#[test]
fn empty_and_nempty() {
    for blank in [json!({}), json!({ "nickname": null }), json!({ "nickname": " " }), json!({ "nickname": [" "] }), json!({ "nickname": [] })] {
        assert!(check(json!({ "nickname": { "$empty": true } }), blank.clone()), "{blank}");
        assert!(!check(json!({ "nickname": { "$nempty": true } }), blank.clone()), "{blank}");
    }
    assert!(!check(json!({ "nickname": { "$empty": true } }), json!({ "nickname": "Claude" })));
    assert!(check(json!({ "nickname": { "$empty": false } }), json!({ "nickname": "Claude" })));
    assert!(check(json!({ "nickname": { "$nempty": true } }), json!({ "nickname": ["", "Claude"] })));
}

#[test]
fn in_and_nin() {
    assert!(check(json!({ "name": { "$in": ["Ravel", "Satie"] } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "keys": { "$in": ["C", "F"] } }), json!({ "keys": ["D", "C"] })));
    assert!(!check(json!({ "name": { "$in": [] } }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": { "$in": ["Ravel"] } }), json!({})));

    assert!(!check(json!({ "name": { "$nin": ["Ravel", "Satie"] } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$nin": ["Debussy"] } }), json!({ "name": "Ravel" })));
    assert!(check(json!({ "name": { "$nin": ["Ravel"] } }), json!({})));
    assert!(check(json!({ "name": { "$nin": [] } }), json!({ "name": "Ravel" })));
}

#[test]
fn all() {
    assert!(check(json!({ "keys": { "$all": ["C", "D"] } }), json!({ "keys": ["D", "E", "C"] })));
    assert!(!check(json!({ "keys": { "$all": ["C", "F"] } }), json!({ "keys": ["D", "E", "C"] })));
    assert!(check(json!({ "keys": { "$all": ["C"] } }), json!({ "keys": "C" })));
    assert!(!check(json!({ "keys": { "$all": ["C", "D"] } }), json!({ "keys": "C" })));
    assert!(!check(json!({ "keys": { "$all": ["C"] } }), json!({})));
    assert!(check(json!({ "keys": { "$all": [] } }), json!({})));
    assert!(check(json!({ "keys": { "$all": [] } }), json!({ "keys": ["C"] })));
}

#[test]
fn ids_stringify_both_sides() {
    assert!(check(json!({ "id": { "$ids": [1, 2, 3] } }), json!({ "id": 1 })));
    assert!(check(json!({ "id": { "$ids": ["1", "2"] } }), json!({ "id": 2 })));
    assert!(!check(json!({ "id": { "$ids": ["a", "b"] } }), json!({ "id": "c" })));
}

// ============================================================================
// Ranges
// ============================================================================

#[test]
fn numeric_ranges() {
    assert!(check(json!({ "year": { "$gt": 1900 } }), json!({ "year": 1928 })));
    assert!(!check(json!({ "year": { "$gt": 1928 } }), json!({ "year": 1928 })));
    assert!(check(json!({ "year": { "$gte": 1928 } }), json!({ "year": 1928 })));
    assert!(check(json!({ "year": { "$lt": 1930 } }), json!({ "year": 1928 })));
    assert!(check(json!({ "year": { "$lte": 1928 } }), json!({ "year": 1928 })));
    assert!(!check(json!({ "year": { "$lt": 1900 } }), json!({ "year": 1928 })));
    assert!(!check(json!({ "year": { "$lt": 1900 } }), json!({})));
}

#[test]
fn ranges_over_arrays_match_any_element() {
    assert!(check(json!({ "years": { "$gt": 1920 } }), json!({ "years": [1899, 1928] })));
    assert!(!check(json!({ "years": { "$gt": 1930 } }), json!({ "years": [1899, 1928] })));
}

#[test]
fn ranges_coerce_strings() {
    assert!(check(json!({ "opus": { "$gt": "22" } }), json!({ "opus": 23 })));
    assert!(check(json!({ "name": { "$gt": "Debussy" } }), json!({ "name": "Ravel" })));
    assert!(!check(json!({ "name": { "$lt": "Debussy" } }), json!({ "name": "Ravel" })));
    assert!(try_check(json!({ "opus": { "$gt": "many" } }), json!({ "opus": 23 })).is_err());
    assert!(try_check(json!({ "published": { "$gt": 0 } }), json!({ "published": true })).is_err());
}

#[test]
fn ranges_over_dates() {
    let config = || clock_at("2026-01-15T12:00:00Z");
    let filter = |query: Json| make_filter(&Value::from(query), config()).unwrap();

    assert!(filter(json!({ "date": { "$gte": "2025-12-30||/y" } }))
        .matches(&Value::from(json!({ "date": "2026-01-01" })))
        .unwrap());
    assert!(!filter(json!({ "date": { "$gte": "2026-01-02" } }))
        .matches(&Value::from(json!({ "date": "2026-01-01" })))
        .unwrap());

    let recent = dated("updated", at("2026-01-15T11:30:00Z"));
    assert!(filter(json!({ "updated": { "$gt": "now-1h" } })).matches(&recent).unwrap());
    assert!(!filter(json!({ "updated": { "$gt": "now-10m" } })).matches(&recent).unwrap());
    assert!(filter(json!({ "updated": { "$gte": "now/d" } })).matches(&recent).unwrap());
    assert!(!filter(json!({ "updated": { "$gte": "now+1d/d" } })).matches(&recent).unwrap());
}

#[test]
fn bad_date_math_surfaces_at_match_time() {
    let filter = make_filter(&Value::from(json!({ "date": { "$gt": "now-1q" } })), FilterConfig::default()).unwrap();
    let err = filter.matches(&dated("date", at("2026-01-01"))).unwrap_err();
    assert!(matches!(err, QueryError::InvalidDateMath { .. }));
}

#[test]
fn between_numbers_and_strings() {
    assert!(check(json!({ "year": { "$between": [1900, 1930] } }), json!({ "year": 1928 })));
    assert!(check(json!({ "year": { "$between": [1928, 1930] } }), json!({ "year": 1928 })));
    assert!(!check(json!({ "year": { "$between": [1900, 1920] } }), json!({ "year": 1928 })));
    assert!(check(json!({ "name": { "$between": ["A", "M"] } }), json!({ "name": "Debussy" })));
    assert!(!check(json!({ "name": { "$between": ["A", "M"] } }), json!({ "name": "Ravel" })));
}

#[test]
fn between_exclusive_bounds() {
    let query = |exclusive: Json| json!({ "year": { "$between": [1928, 1930], "$exclusive": exclusive } });

    assert!(!check(query(json!(true)), json!({ "year": 1928 })));
    assert!(!check(query(json!(true)), json!({ "year": 1930 })));
    assert!(check(query(json!(true)), json!({ "year": 1929 })));
    assert!(!check(query(json!("min")), json!({ "year": 1928 })));
    assert!(check(query(json!("min")), json!({ "year": 1930 })));
    assert!(check(query(json!("max")), json!({ "year": 1928 })));
    assert!(!check(query(json!("max")), json!({ "year": 1930 })));
    assert!(check(query(json!(false)), json!({ "year": 1930 })));
}

#[test]
fn between_date_math() {
    let filter = make_filter(
        &Value::from(json!({ "updated": { "$between": ["now-1m", "now+1m"] } })),
        clock_at("2026-01-15T12:00:00Z"),
    )
    .unwrap();

    assert!(filter.matches(&dated("updated", at("2026-01-15T12:00:30Z"))).unwrap());
    assert!(!filter.matches(&dated("updated", at("2026-01-15T12:02:00Z"))).unwrap());
    assert!(!filter.matches(&dated("updated", at("2026-01-15T11:58:00Z"))).unwrap());
}

#[test]
fn between_requires_two_bounds() {
    let err = make_filter(&Value::from(json!({ "year": { "$between": [1900] } })), FilterConfig::default()).unwrap_err();
    assert!(matches!(err, QueryError::InvalidOperandShape { .. }));
}

// ============================================================================
// Geo
// ============================================================================

#[test]
fn near_with_default_arc_distance() {
    assert!(near(json!(BERMUDA), json!({ "$maxDistance": "8207mi" }), json!(JAX_DOWNTOWN)).unwrap());
    assert!(!near(json!(BERMUDA), json!({ "$maxDistance": "8205mi" }), json!(JAX_DOWNTOWN)).unwrap());
    assert!(near(json!(JAX_BEACH), json!({ "$maxDistance": "16mi" }), json!(JAX_DOWNTOWN)).unwrap());
    assert!(!near(json!(JAX_BEACH), json!({ "$maxDistance": "14mi" }), json!(JAX_DOWNTOWN)).unwrap());
}

#[test]
fn near_with_plane_distance() {
    let plane = |max: &str| json!({ "$maxDistance": max, "$distanceType": "plane" });
    assert!(near(json!(JAX_BEACH), plane("16mi"), json!(JAX_DOWNTOWN)).unwrap());
    assert!(!near(json!(JAX_BEACH), plane("14mi"), json!(JAX_DOWNTOWN)).unwrap());

    assert!(near(json!(BERMUDA), json!({ "$maxDistance": "9000mi" }), json!(JAX_DOWNTOWN)).unwrap());
    assert!(!near(json!(BERMUDA), plane("9000mi"), json!(JAX_DOWNTOWN)).unwrap());
}

#[test]
fn near_with_lon_lat_objects() {
    let bermuda = json!({ "lon": BERMUDA[0], "lat": BERMUDA[1] });
    let downtown = json!({ "lon": JAX_DOWNTOWN[0], "lat": JAX_DOWNTOWN[1] });
    assert!(near(bermuda.clone(), json!({ "$maxDistance": "8207mi" }), downtown.clone()).unwrap());
    assert!(!near(bermuda, json!({ "$maxDistance": "8205mi" }), downtown).unwrap());
}

#[test]
fn near_distance_units() {
    let within = |max: Json| near(json!(BERMUDA), json!({ "$maxDistance": max }), json!(JAX_DOWNTOWN));

    assert!(within(json!("8207miles")).unwrap());
    assert!(!within(json!("8205miles")).unwrap());
    assert!(within(json!("13208km")).unwrap());
    assert!(!within(json!("13206km")).unwrap());
    assert!(within(json!("13208kilometers")).unwrap());
    assert!(!within(json!("13206kilometers")).unwrap());
    assert!(within(json!(2.08)).unwrap());
    assert!(!within(json!(2.06)).unwrap());
    assert!(matches!(within(json!("13206m")), Err(QueryError::InvalidDistance(_))));
}

#[test]
fn near_any_location_in_an_array() {
    let locations = json!([BERMUDA, JAX_BEACH]);
    assert!(near(json!(JAX_DOWNTOWN), json!({ "$maxDistance": "16mi" }), locations.clone()).unwrap());
    assert!(!near(json!(JAX_DOWNTOWN), json!({ "$maxDistance": "14mi" }), locations).unwrap());

    let missing = try_check(
        json!({ "location": { "$near": JAX_DOWNTOWN, "$maxDistance": "16mi" } }),
        json!({ "name": "Ravel" }),
    );
    assert!(!missing.unwrap());
}

// ============================================================================
// Compound conditions
// ============================================================================

#[test]
fn and_or_nor_not() {
    let ravel = json!({ "firstName": "Maurice", "lastName": "Ravel" });
    let debussy = json!({ "firstName": "Claude", "lastName": "Debussy" });
    let mixed = json!({ "firstName": "Maurice", "lastName": "Debussy" });
    let pair = json!([{ "firstName": "Maurice" }, { "lastName": "Ravel" }]);

    assert!(check(json!({ "$and": pair }), ravel.clone()));
    assert!(!check(json!({ "$and": pair }), debussy.clone()));
    assert!(!check(json!({ "$and": pair }), mixed.clone()));

    assert!(check(json!({ "$or": pair }), ravel.clone()));
    assert!(!check(json!({ "$or": pair }), debussy.clone()));
    assert!(check(json!({ "$or": pair }), mixed.clone()));

    assert!(!check(json!({ "$nor": pair }), ravel.clone()));
    assert!(check(json!({ "$nor": pair }), debussy.clone()));
    assert!(!check(json!({ "$nor": pair }), mixed));

    assert!(!check(json!({ "$not": { "firstName": "Maurice" } }), ravel));
    assert!(check(json!({ "$not": { "firstName": "Maurice" } }), debussy));
}

#[test]
fn adjacent_compound_operators() {
    let filter = make_filter(
        &Value::from(json!({
            "instrument": "piano",
            "$and": [{ "year": { "$gt": 1928 } }],
            "$or": [{ "firstName": "Maurice" }, { "firstName": "Claude" }],
            "$not": { "works": { "$in": ["Clair de lune"] } }
        })),
        FilterConfig::default(),
    )
    .unwrap();
    let record = |instrument: &str, year: i64, first: &str, work: &str| {
        Value::from(json!({ "instrument": instrument, "year": year, "firstName": first, "works": [work] }))
    };

    assert!(filter.matches(&record("piano", 1930, "Maurice", "Bolero")).unwrap());
    assert!(!filter.matches(&record("conductor", 1930, "Maurice", "Bolero")).unwrap());
    assert!(!filter.matches(&record("piano", 1928, "Maurice", "Bolero")).unwrap());
    assert!(!filter.matches(&record("piano", 1930, "Claude", "Clair de lune")).unwrap());
    assert!(!filter.matches(&record("piano", 1930, "Erik", "Gymnopedie No. 1")).unwrap());
}

#[test]
fn nested_compounds() {
    let query = json!({ "$or": [
        { "composer": "Debussy" },
        { "$and": [{ "era": "impressionist" }, { "nationality": "French" }] }
    ] });
    assert!(check(query.clone(), json!({ "composer": "Debussy", "era": "romantic", "nationality": "French" })));
    assert!(check(query.clone(), json!({ "composer": "Ravel", "era": "impressionist", "nationality": "French" })));
    assert!(!check(query.clone(), json!({ "composer": "Ravel", "era": "romantic", "nationality": "French" })));
    assert!(!check(query, json!({ "composer": "Chopin", "era": "romantic", "nationality": "Polish" })));

    let query = json!({ "$or": [{ "composer": "Debussy" }, { "composer": "Ravel" }], "year": { "$gt": 1928 } });
    assert!(check(query.clone(), json!({ "composer": "Ravel", "year": 1930 })));
    assert!(!check(query.clone(), json!({ "composer": "Debussy", "year": 1925 })));
    assert!(!check(query, json!({ "composer": "Debussy" })));
}

#[test]
fn nor_with_exists_and_empty() {
    let query = json!({ "$nor": [{ "opus": { "$exists": false } }, { "nickname": { "$empty": true } }] });
    assert!(check(query.clone(), json!({ "composer": "Debussy", "opus": 23, "nickname": "Claude" })));
    assert!(!check(query.clone(), json!({ "composer": "Ravel", "nickname": "" })));
    assert!(!check(query, json!({ "composer": "Ravel" })));
}

#[test]
fn field_level_negation() {
    assert!(check(json!({ "year": { "$not": { "$lt": 1920 } } }), json!({ "year": 1928 })));
    assert!(!check(json!({ "year": { "$not": { "$lt": 1930 } } }), json!({ "year": 1928 })));
}

// ============================================================================
// Nested documents
// ============================================================================

#[test]
fn elem_match() {
    let query = json!({ "tags": { "$elemMatch": { "key": "occupation", "value": { "$eq": "composer" } } } });
    assert!(check(query.clone(), json!({ "tags": [{ "key": "occupation", "value": "composer" }] })));
    assert!(!check(query.clone(), json!({ "tags": [{ "key": "name", "value": "Maurice" }] })));
    assert!(!check(query.clone(), json!({ "tags": [{ "key": "job", "value": "composer" }] })));

    let err = try_check(query, json!({ "tags": "composer" })).unwrap_err();
    assert!(matches!(err, QueryError::ElemMatchType { ref field, actual: "string" } if field == "tags"));
}

#[test]
fn elem_match_on_a_missing_field_fails() {
    let err = try_check(json!({ "works": { "$elemMatch": { "bpm": 130 } } }), json!({ "title": "Bolero" })).unwrap_err();
    assert!(matches!(err, QueryError::ElemMatchType { ref field, actual: "missing" } if field == "works"));

    let nested = json!({ "works": { "$elemMatch": { "performers": { "$elemMatch": { "name": "Ravel" } } } } });
    let err = try_check(nested, json!({ "works": [{ "title": "Bolero" }] })).unwrap_err();
    assert!(matches!(err, QueryError::ElemMatchType { ref field, .. } if field == "works.performers"));
}

#[test]
fn elem_match_with_compounds() {
    let query = json!({ "tags": { "$elemMatch": { "$not": { "key": "occupation", "value": { "$eq": "composer" } } } } });
    assert!(!check(query.clone(), json!({ "tags": [{ "key": "occupation", "value": "composer" }] })));
    assert!(check(query.clone(), json!({ "tags": [{ "key": "name", "value": "Maurice" }] })));
    assert!(check(query, json!({ "tags": [{ "key": "job", "value": "composer" }] })));

    let query = json!({ "works": { "$elemMatch": {
        "title": { "$like": "*Bolero*" },
        "$not": { "year": { "$lt": 1920 } }
    } } });
    assert!(check(query.clone(), json!({ "works": [{ "title": "Bolero", "year": 1928 }] })));
    assert!(!check(query.clone(), json!({ "works": [{ "title": "Bolero", "year": 1918 }] })));
    assert!(!check(query, json!({ "works": [{ "title": "Daphnis et Chloé", "year": 1912 }] })));
}

#[test]
fn nested_elem_match() {
    let query = json!({ "works": { "$elemMatch": {
        "title": "Bolero",
        "performers": { "$elemMatch": { "name": "Maurice Ravel", "instrument": "piano" } }
    } } });

    assert!(check(
        query.clone(),
        json!({ "works": [
            { "title": "Bolero", "performers": [
                { "name": "Maurice Ravel", "instrument": "piano" },
                { "name": "Jane Doe", "instrument": "violin" }
            ] },
            { "title": "Daphnis et Chloé", "performers": [{ "name": "Maurice Ravel", "instrument": "conductor" }] }
        ] })
    ));
    assert!(!check(
        query.clone(),
        json!({ "works": [
            { "title": "Bolero", "performers": [
                { "name": "Maurice Ravel", "instrument": "conductor" },
                { "name": "Jane Doe", "instrument": "violin" }
            ] },
            { "title": "Daphnis et Chloé", "performers": [{ "name": "Maurice Ravel", "instrument": "piano" }] }
        ] })
    ));
    assert!(!check(
        query,
        json!({ "works": [{ "title": "Bolero", "performers": [{ "name": "Jane Doe", "instrument": "violin" }] }] })
    ));
}

#[test]
fn elem_match_splits_all_per_element() {
    let query = json!({ "works": { "$elemMatch": { "bpm": 130, "keys": { "$all": ["C", "C#"] } } } });
    assert!(check(
        query.clone(),
        json!({ "works": [{ "bpm": 130, "keys": "C" }, { "bpm": 130, "keys": "C#" }] })
    ));
    assert!(!check(query.clone(), json!({ "works": [{ "bpm": 130, "keys": "C" }] })));
    assert!(!check(
        query,
        json!({ "works": [{ "bpm": 130, "keys": "C" }, { "bpm": 90, "keys": "C#" }] })
    ));
}

#[test]
fn dot_paths() {
    let data = json!({
        "name": { "first": "Maurice", "last": "Ravel" },
        "works": [
            { "name": "La Valse", "key": "D", "year": 1919, "info": { "length": 300 } },
            { "name": "Bolero", "key": "C", "year": 1928, "info": { "length": 500 } }
        ]
    });

    assert!(check(json!({ "name.last": "Ravel" }), data.clone()));
    assert!(!check(json!({ "name.first": "Ravel" }), data.clone()));
    assert!(!check(json!({ "name.middle": "" }), data.clone()));
    assert!(check(json!({ "works.key": "D" }), data.clone()));
    assert!(check(json!({ "works.key": "C" }), data.clone()));
    assert!(!check(json!({ "works.key": "F#" }), data.clone()));
    assert!(check(json!({ "works.info.length": { "$between": [100, 500] } }), data.clone()));
    assert!(!check(json!({ "works.info.length": { "$between": [400, 450] } }), data));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn malformed_queries_fail_to_compile() {
    let compile = |query: Json| make_filter(&Value::from(query), FilterConfig::default());

    assert!(matches!(compile(json!({})), Err(QueryError::MalformedQuery { .. })));
    assert!(matches!(compile(json!({ "$and": [] })), Err(QueryError::MalformedQuery { .. })));
    assert!(matches!(compile(json!({ "$bogus": 1 })), Err(QueryError::MalformedQuery { .. })));
    assert!(matches!(
        compile(json!({ "name": { "$eq": "a", "$in": ["b"] } })),
        Err(QueryError::TooManyOperators { .. })
    ));
    assert!(matches!(
        compile(json!({ "name": { "$fuzz": "Ravel" } })),
        Err(QueryError::UnknownOperator { .. })
    ));
}

// ============================================================================
// Collections and typed records
// ============================================================================

#[derive(Serialize)]
struct Composer {
    name: &'static str,
    born: u32,
    works: Vec<&'static str>,
}

#[test]
fn serialized_records() {
    let filter = make_filter(
        &Value::from(json!({ "born": { "$lt": 1870 }, "works": { "$includes": "Gymno" } })),
        FilterConfig::default(),
    )
    .unwrap();

    let satie = Composer {
        name: "Erik Satie",
        born: 1866,
        works: vec!["Gymnopédie No. 1", "Vexations"],
    };
    let ravel = Composer {
        name: "Maurice Ravel",
        born: 1875,
        works: vec!["Bolero"],
    };

    assert!(filter.matches_serialized(&satie).unwrap());
    assert!(!filter.matches_serialized(&ravel).unwrap());
    assert_eq!(satie.name, "Erik Satie");
}

#[test]
fn collection_helpers() {
    let records: Vec<Value> = vec![
        json!({ "name": "Ravel", "year": 1875 }),
        json!({ "name": "Debussy", "year": 1862 }),
        json!({ "name": "Satie", "year": 1866 }),
    ]
    .into_iter()
    .map(Value::from)
    .collect();

    let filter = make_filter(&Value::from(json!({ "year": { "$lt": 1870 } })), FilterConfig::default()).unwrap();

    let found = filter.filter(&records).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].to_json()["name"], json!("Debussy"));
    assert_eq!(filter.count(&records).unwrap(), 2);
    assert_eq!(filter.find(&records).unwrap().map(|r| r.to_json()["name"].clone()), Some(json!("Debussy")));
    assert!(filter.any(&records).unwrap());
    assert!(!filter.all(&records).unwrap());

    let predicate = filter.as_predicate();
    assert!(!predicate(&records[0]).unwrap());
}
