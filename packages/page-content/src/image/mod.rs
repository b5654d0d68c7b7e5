//! Illustration selection: candidate checks, header sniffing and the
//! selector that ties them to a [`crate::fetch::Fetcher`].

pub mod candidate;
pub mod selector;
pub mod sniff;

pub use candidate::{ImageMeta, ImageSource, Rejection, WebImage};
pub use selector::ImageSelector;
pub use sniff::{sniff, ImageInfo, SniffedFormat};
