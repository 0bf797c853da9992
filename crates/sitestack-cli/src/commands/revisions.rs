//! Built-in revision listing.

use sitestack_core::Revision;

pub fn list() {
    for revision in Revision::ALL {
        println!("{:<24} {}", revision.name(), revision.summary());
    }
}
