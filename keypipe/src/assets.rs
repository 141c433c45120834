//! Default configuration compiled into the binary.
//!
//! These files form the bundled tier. Users never edit them; their changes
//! go to the custom tier and layer on top per key.

use keypipe_core::MemorySource;
use once_cell::sync::Lazy;

/// Logical path → contents for every bundled file.
pub static BUNDLED_FILES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("layouts/qwerty.json", include_str!("../assets/layouts/qwerty.json")),
        ("layouts/azerty.json", include_str!("../assets/layouts/azerty.json")),
        ("layouts/qwertz.json", include_str!("../assets/layouts/qwertz.json")),
        (
            "layouts/it_multitap.json",
            include_str!("../assets/layouts/it_multitap.json"),
        ),
        ("layouts/locales.json", include_str!("../assets/layouts/locales.json")),
        ("variations.json", include_str!("../assets/variations.json")),
        ("ctrl_mappings.json", include_str!("../assets/ctrl_mappings.json")),
        ("corrections/en.json", include_str!("../assets/corrections/en.json")),
        ("corrections/it.json", include_str!("../assets/corrections/it.json")),
        (
            "dictionaries/en_base.json",
            include_str!("../assets/dictionaries/en_base.json"),
        ),
        (
            "dictionaries/it_base.json",
            include_str!("../assets/dictionaries/it_base.json"),
        ),
    ]
});

/// A fresh read-only source over the bundled files.
pub fn bundled_source() -> MemorySource {
    BUNDLED_FILES
        .iter()
        .fold(MemorySource::new("bundled"), |source, (path, contents)| {
            source.with_file(path, contents)
        })
}
