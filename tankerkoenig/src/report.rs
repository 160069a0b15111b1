//! Single request to the list endpoint, with every step of its handling printed out.
//!
//! Failures are printed, not returned: the only errors of [report] come from writing the
//! output itself.

use std::io::{self, Write};

use crate::{read_body, ApiResult, Client};

pub const START_BANNER: &str = "== Tankerkoenig station list ==";
pub const END_BANNER: &str = "== done ==";

/// How far the request got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No response was received
    TransportFailed,
    /// The response had a status other than 200
    BadStatus(u16),
    /// The body could not be read
    Unreadable,
    /// The body decoded (or failed to) into a result with `ok` unset
    Rejected,
    Accepted,
}

/// Fetch `url` and print the outcome to `out`, enclosed in [START_BANNER] and [END_BANNER].
///
/// A body that fails to decode is still printed, and then checked as an [ApiResult] with every
/// field at its zero value, so it always ends up [Outcome::Rejected].
pub fn report<W: Write>(client: &Client, url: &str, out: &mut W) -> io::Result<Outcome> {
    writeln!(out, "{START_BANNER}")?;
    let outcome = fetch_and_print(client, url, out)?;
    writeln!(out, "{END_BANNER}")?;

    log::debug!("report finished: {outcome:?}");
    Ok(outcome)
}

fn fetch_and_print<W: Write>(client: &Client, url: &str, out: &mut W) -> io::Result<Outcome> {
    let response = match client.call(url) {
        Ok(response) => response,
        Err(e) => {
            log::warn!("request failed: {}", e.kind());
            writeln!(out, "Error {e}")?;
            return Ok(Outcome::TransportFailed);
        }
    };

    let status = response.status();
    if status != 200 {
        log::warn!("request returned status {status}");
        writeln!(
            out,
            "Request not successful. Current status code {status} | {status} {}",
            response.status_text()
        )?;
        return Ok(Outcome::BadStatus(status));
    }

    let body = match read_body(response) {
        Ok(body) => body,
        Err(e) => {
            log::warn!("could not read body: {e}");
            writeln!(out, "Error {e}")?;
            return Ok(Outcome::Unreadable);
        }
    };

    let result = match serde_json::from_slice::<ApiResult>(&body) {
        Ok(result) => result,
        Err(e) => {
            log::warn!("could not decode body: {e}");
            writeln!(out, "could not decode response: {e}")?;
            ApiResult::default()
        }
    };

    writeln!(out, "{}", String::from_utf8_lossy(&body))?;

    if !result.ok {
        writeln!(out, "Request not successful: {}", result.message)?;
        return Ok(Outcome::Rejected);
    }

    Ok(Outcome::Accepted)
}
