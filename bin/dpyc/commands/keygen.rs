//! Keygen command - create a fresh Nostr identity

use crate::output::{self, Field, Tone};
use anyhow::Result;
use dpyc_oracle::Keys;

pub fn run() -> Result<()> {
    let keys = Keys::generate();

    output::section("New Nostr Identity");
    output::field("npub", &keys.npub(), Field::Public);
    output::field("nsec", &keys.nsec(), Field::Secret);
    println!();
    output::status(Tone::Warn, "Keep the nsec secret. Share only the npub.");
    println!();
    Ok(())
}
