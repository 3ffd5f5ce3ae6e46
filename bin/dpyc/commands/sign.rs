//! Sign command - answer a citizenship challenge

use crate::output::{self, Field, Tone};
use anyhow::{Context, Result};
use dpyc_oracle::identity::challenge_marker;
use dpyc_oracle::Keys;

/// Print the signed event JSON. With `quiet`, print only the JSON so it can be piped.
pub fn run(nsec: &str, nonce: &str, quiet: bool) -> Result<()> {
    let keys = Keys::parse_nsec(nsec.trim()).context("Failed to parse nsec")?;
    let event = keys.sign_text_note(&challenge_marker(nonce.trim()));
    let json = event.to_json();

    if quiet {
        println!("{}", json);
        return Ok(());
    }

    output::section("Citizenship Proof");
    output::field("npub", &keys.npub(), Field::Public);
    output::field("Content", &event.content, Field::Plain);
    output::field("Event id", &event.id, Field::Plain);
    println!();
    println!("{}", json);
    println!();
    output::status(
        Tone::Note,
        "Pass this JSON as signed_event_json to confirm_citizenship.",
    );
    Ok(())
}
