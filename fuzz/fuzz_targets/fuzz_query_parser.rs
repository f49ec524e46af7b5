#![no_main]

use libfuzzer_sys::fuzz_target;
use pathix::query::{ParseableQuery, parse_query};

fuzz_target!(|data: &str| {
    // Anything that parses must print back to text that parses to the same predicate
    if let Ok(query) = parse_query(data) {
        let text = query.to_query_string();
        let reparsed = parse_query(&text).expect("printed predicate parses");
        assert_eq!(reparsed, query, "{text}");
        assert_eq!(ParseableQuery::from_xml_node(&query.to_xml_node()).ok(), Some(query));
    }
});
