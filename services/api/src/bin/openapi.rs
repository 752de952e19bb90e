//! services/api/src/bin/openapi.rs
//!
//! Writes the service's OpenAPI document to disk.
//!
//! Usage: `openapi [OUTPUT] [--with-users]`. OUTPUT defaults to `openapi.json`;
//! `--with-users` keeps the optional `/users` route in the document.

use api_lib::web::rest::api_doc;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let mut output = "openapi.json".to_string();
    let mut with_users = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--with-users" => with_users = true,
            _ => output = arg,
        }
    }

    let json = api_doc(with_users).to_pretty_json()?;
    std::fs::write(&output, json)?;
    println!("Wrote OpenAPI document to {}", output);
    Ok(())
}
