//! XML building and scanning utilities.

mod scan;
mod writer;

pub use scan::{find_element, find_elements, find_end_tag, find_start_tag, tag_end};
pub use writer::{escape, present, XmlWriter};
