#![no_main]

use libfuzzer_sys::fuzz_target;
use nixnav::utils::Bookmark;

fuzz_target!(|data: &str| {
    // Must never panic, whatever the colons and spaces
    let bookmarks = [Bookmark::new("proj", "/p"), Bookmark::new("My Docs", "/d")];
    let parsed = nixnav::query::parse_query(data, &bookmarks);
    if let Some(ext) = parsed.extension {
        assert!(!ext.is_empty());
    }
});
