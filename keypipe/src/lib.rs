//! keypipe: bundled configuration, service facade and script simulation on
//! top of `keypipe-core`.

pub mod assets;
pub mod service;
pub mod simulate;

pub use assets::bundled_source;
pub use service::{default_config_dir, ImeService, PERSONAL_DICT_FILE};
pub use simulate::{parse_script, Stroke};
