//! Course catalog scraping.
//!
//! Seat counts are found in two steps:
//! 1. The listing page for a course has one `th.ddtitle` heading per section,
//!    each linking to that section's detail page
//! 2. The detail page has a table with a `Seats` row and a `Waitlist Seats`
//!    row, each holding capacity / actual / remaining cells

mod client;
mod error;
mod types;

pub use client::{CatalogClient, CatalogConfig, NotFoundPolicy, SeatSource};
pub use error::FetchError;
pub use types::*;

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.ddtitle").unwrap());
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static SPAN_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Label of the row holding regular seat counts.
const SEATS_LABEL: &str = "Seats";
/// Label of the row holding waitlist seat counts.
const WAITLIST_LABEL: &str = "Waitlist Seats";

/// Finds the detail-page link for `section` on a course listing page.
///
/// Headings read like `SENG 275 - A01 - 12345`. The first heading whose link
/// text contains `section` wins, so `A01` will also match an `A010` heading
/// if that one comes first.
///
/// Returns `Ok(None)` when no heading matches. A matching heading whose link
/// has no usable `href` is a parse error.
pub fn parse_listing(html: &str, section: &str) -> Result<Option<String>, FetchError> {
    let document = Html::parse_document(html);

    let Some(link) = document
        .select(&HEADING_SELECTOR)
        .filter_map(|th| th.select(&LINK_SELECTOR).next())
        .find(|link| link.text().collect::<String>().contains(section))
    else {
        return Ok(None);
    };

    match link.value().attr("href").map(str::trim) {
        Some(href) if !href.is_empty() => Ok(Some(href.to_string())),
        _ => Err(FetchError::parse(format!(
            "heading for section '{section}' has no detail link"
        ))),
    }
}

/// Reads seat and waitlist counts from a section detail page.
pub fn parse_detail(html: &str) -> Result<SeatSnapshot, FetchError> {
    let document = Html::parse_document(html);

    let seats = parse_counts_row(&document, SEATS_LABEL)?;
    let waitlist = parse_counts_row(&document, WAITLIST_LABEL)?;

    Ok(SeatSnapshot { seats, waitlist })
}

/// Parses the three numeric cells in the table row labelled `label`.
///
/// The label is a `span` inside a header cell, so the row is the span's
/// grandparent.
fn parse_counts_row(document: &Html, label: &str) -> Result<SeatCounts, FetchError> {
    let span = document
        .select(&SPAN_SELECTOR)
        .find(|span| span.text().collect::<String>().trim() == label)
        .ok_or_else(|| FetchError::parse(format!("no '{label}' label on detail page")))?;

    let row = span
        .parent()
        .and_then(|cell| cell.parent())
        .and_then(ElementRef::wrap)
        .ok_or_else(|| FetchError::parse(format!("'{label}' label is not inside a table row")))?;

    let values = row
        .select(&CELL_SELECTOR)
        .take(3)
        .map(|cell| parse_cell(&cell, label))
        .collect::<Result<Vec<u32>, FetchError>>()?;

    match values.as_slice() {
        [capacity, actual, remaining] => Ok(SeatCounts::new(*capacity, *actual, *remaining)),
        _ => Err(FetchError::parse(format!(
            "expected 3 cells in '{label}' row, found {}",
            values.len()
        ))),
    }
}

fn parse_cell(cell: &ElementRef, label: &str) -> Result<u32, FetchError> {
    let text = cell.text().collect::<String>();
    text.trim().parse::<u32>().map_err(|_| {
        FetchError::parse(format!(
            "non-numeric cell '{}' in '{label}' row",
            text.trim()
        ))
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Listing page with the same markup as the Banner catalog.
    pub fn listing_page(sections: &[(&str, &str)]) -> String {
        let rows: String = sections
            .iter()
            .map(|(label, href)| {
                format!(
                    r#"<tr><th class="ddtitle" scope="colgroup"><a href="{href}">{label}</a></th></tr>
                    <tr><td class="dddefault">Lecture</td></tr>"#
                )
            })
            .collect();
        format!(
            r#"<html><body><table class="datadisplaytable" summary="This layout table is used to present the sections found">{rows}</table></body></html>"#
        )
    }

    pub fn detail_page(seats: [&str; 3], waitlist: [&str; 3]) -> String {
        format!(
            r#"<html><body>
            <table class="datadisplaytable" summary="This layout table is used to present the seating numbers.">
              <caption class="captiontext">Registration Availability</caption>
              <tr>
                <th class="ddheader" scope="col"><span class="fieldlabeltext"></span></th>
                <th class="ddheader" scope="col"><span class="fieldlabeltext">Capacity</span></th>
                <th class="ddheader" scope="col"><span class="fieldlabeltext">Actual</span></th>
                <th class="ddheader" scope="col"><span class="fieldlabeltext">Remaining</span></th>
              </tr>
              <tr>
                <th class="ddlabel" scope="row"><span class="fieldlabeltext">Seats</span></th>
                <td class="dddefault">{}</td><td class="dddefault">{}</td><td class="dddefault">{}</td>
              </tr>
              <tr>
                <th class="ddlabel" scope="row"><span class="fieldlabeltext">Waitlist Seats</span></th>
                <td class="dddefault">{}</td><td class="dddefault">{}</td><td class="dddefault">{}</td>
              </tr>
            </table>
            </body></html>"#,
            seats[0], seats[1], seats[2], waitlist[0], waitlist[1], waitlist[2]
        )
    }
}
