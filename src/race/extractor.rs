//! Heuristic start-list extraction from a rendered page

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::equipment;
use super::types::{Entrant, NO_QUOTE_ODDS};

/// A structural shape an entrant row may take.
pub struct RowFingerprint {
    pub name: &'static str,
    pub css: &'static str,
}

pub const ROW_FINGERPRINTS: &[RowFingerprint] = &[
    RowFingerprint { name: "aria-row", css: "[role='row']" },
    RowFingerprint {
        name: "start-list-row",
        css: "[data-test-id*='startlist-row'], [data-test-id*='start-list-row']",
    },
    RowFingerprint {
        name: "component-row",
        css: "[class*='StartlistRow'], [class*='startlist-row'], [class*='HorseRow'], [class*='horse-row']",
    },
    RowFingerprint { name: "table-row", css: "tbody tr" },
];

const SCRATCH_TERMS: &[&str] = &["struken", "strukna", "scratched", "avanmäld", "utgår"];
const SCRATCH_CLASSES: &[&str] = &["scratch", "struken"];

const NAME_MIN_CHARS: usize = 4;
const NAME_MAX_CHARS: usize = 29;

static ROW: Lazy<Selector> = Lazy::new(|| {
    let css = ROW_FINGERPRINTS
        .iter()
        .map(|f| f.css)
        .collect::<Vec<_>>()
        .join(", ");
    Selector::parse(&css).unwrap_or_else(|e| panic!("invalid row fingerprint: {e:?}"))
});
static HEADER_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, [role='columnheader']").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[data-test-id*='race-name'], [class*='RaceName'], [class*='race-name'], h1, h2")
        .unwrap()
});
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\p{Lu}[\p{L}'’.]*(?: \p{Lu}[\p{L}'’.]*)+\b").unwrap());
/// Whole percentages (`41%`) appear next to decimal ones, so the fraction
/// is optional. A trend may carry a sign.
static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+\-−]?)(\d+(?:[.,]\d+)?)\s*%").unwrap());
static RECORD_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d[.:]\d{2}[.,]\d[a-zA-Z]*").unwrap());
static PRIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:[ \u{a0}.]\d{3})+|\d+)\s*(?:kr|SEK)\b").unwrap());
static ODDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,3}[.,]\d{1,2})\b").unwrap());
static DISTANCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3,4})\s?m\b").unwrap());

/// Result of one page scan.
#[derive(Debug, Default)]
pub struct Extraction {
    pub entrants: Vec<Entrant>,
    /// Structural matches that did not look like an entrant row.
    pub dropped_rows: usize,
}

/// Descriptive fields of a division page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DivisionMeta {
    pub title: String,
    pub distance: String,
}

pub struct EntrantExtractor {
    event_code: String,
}

impl EntrantExtractor {
    pub fn new(event_code: impl Into<String>) -> Self {
        Self {
            event_code: event_code.into(),
        }
    }

    /// Scan every row-like element. Never fails; rows that do not parse are
    /// dropped and counted.
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();

        for row in document.select(&ROW) {
            // Nested fingerprints: the innermost row carries the data.
            if row.select(&ROW).any(|inner| inner.id() != row.id()) {
                continue;
            }

            let position = extraction.entrants.len() as u32 + 1;
            match self.parse_row(row, position) {
                Some(entrant) => extraction.entrants.push(entrant),
                None => extraction.dropped_rows += 1,
            }
        }

        info!(
            "Extracted {} entrants ({} rows dropped)",
            extraction.entrants.len(),
            extraction.dropped_rows
        );
        extraction
    }

    fn parse_row(&self, row: ElementRef<'_>, position: u32) -> Option<Entrant> {
        if row.select(&HEADER_CELL).next().is_some() {
            debug!("Skipping header row");
            return None;
        }

        let segments = text_segments(row);
        let text = segments.join(" ");

        let Some(name) = self.find_name(&segments) else {
            debug!("Row rejected, no entrant name: {:?}", truncate(&text, 80));
            return None;
        };

        let mut entrant = Entrant::new(position, name);

        let mut percents = percentages(&text).into_iter();
        entrant.v75_percent = percents.next().unwrap_or(0.0);
        entrant.trend_percent = percents.next().unwrap_or(0.0);

        if let Some(m) = RECORD_TIME.find(&text) {
            entrant.record_time = m.as_str().to_string();
        }
        if let Some(c) = PRIZE.captures(&text) {
            entrant.prize_money = parse_integer(&c[1]).unwrap_or(0);
        }

        // Odds are whatever decimals remain once the other numeric fields
        // are taken out.
        let residual = PERCENT.replace_all(&text, " ");
        let residual = RECORD_TIME.replace_all(&residual, " ");
        let residual = PRIZE.replace_all(&residual, " ");
        let mut odds = ODDS.captures_iter(&residual).filter_map(|c| parse_decimal(&c[1]));
        entrant.win_odds = odds.next().unwrap_or(NO_QUOTE_ODDS);
        entrant.place_odds = odds.next().unwrap_or(NO_QUOTE_ODDS);

        entrant.scratched = is_scratched(row, &text);
        entrant.equipment = equipment::resolve_row(row);
        entrant.enforce_scratch_invariant();

        Some(entrant)
    }

    /// First capitalized multi-word run of plausible length that is not the
    /// game name or a shoe description.
    fn find_name(&self, segments: &[String]) -> Option<String> {
        let code = self.event_code.to_lowercase();
        segments
            .iter()
            .flat_map(|segment| NAME.find_iter(segment))
            .map(|m| m.as_str().trim_end_matches('.').to_string())
            .find(|candidate| {
                let len = candidate.chars().count();
                (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len)
                    && (code.is_empty() || !candidate.to_lowercase().contains(&code))
                    && !equipment::normalize(candidate).is_known()
            })
    }

    /// Title and distance of the division page.
    pub fn division_meta(&self, html: &str) -> DivisionMeta {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE)
            .map(|el| text_segments(el).join(" "))
            .find(|t| !t.is_empty())
            .unwrap_or_default();

        let body_text = document
            .select(&BODY)
            .next()
            .map(|b| text_segments(b).join(" "))
            .unwrap_or_default();
        let distance = DISTANCE
            .captures(&title)
            .or_else(|| DISTANCE.captures(&body_text))
            .map(|c| format!("{} m", &c[1]))
            .unwrap_or_default();

        DivisionMeta { title, distance }
    }
}

/// Visible text nodes, trimmed and whitespace-collapsed.
fn text_segments(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_scratched(row: ElementRef<'_>, text: &str) -> bool {
    let lower = text.to_lowercase();
    if SCRATCH_TERMS.iter().any(|term| lower.contains(term)) {
        return true;
    }
    let class = row.value().attr("class").unwrap_or_default().to_lowercase();
    SCRATCH_CLASSES.iter().any(|c| class.contains(c))
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}

/// Signed percentages in reading order. A sign only counts when it does not
/// hang off a word, so `Boy-4%` stays positive.
fn percentages(text: &str) -> Vec<f64> {
    PERCENT
        .captures_iter(text)
        .filter_map(|c| {
            let value = parse_decimal(&c[2])?;
            let negative = c.get(1).is_some_and(|sign| {
                matches!(sign.as_str(), "-" | "−")
                    && text[..sign.start()]
                        .chars()
                        .next_back()
                        .map_or(true, |ch| !ch.is_alphanumeric())
            });
            Some(if negative { -value } else { value })
        })
        .collect()
}

fn parse_integer(raw: &str) -> Option<u64> {
    raw.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::types::Equipment;

    const START_LIST: &str = r#"
        <html><body>
          <h2 data-test-id="race-name">V75-1 Bronsdivisionen, 2140 m Autostart</h2>
          <div role="table">
            <div role="row"><span role="columnheader">Häst/Kusk</span><span role="columnheader">V75%</span></div>
            <div role="row" class="startlist-row">
              <span>1</span><span>Global Badman</span><span>Örjan Kihlström</span>
              <span>1.11,2a</span><span>1 234 500 kr</span>
              <span>23,5%</span><span>+2,1%</span><span>3,45</span><span>1,20</span>
              <span class="shoes" aria-label="barfota fram, skor bak"></span>
            </div>
            <div role="row" class="startlist-row">
              <span>2</span><span>Don Fanucci Zet</span><span>Björn Goop</span>
              <span>41%</span><span>12,80</span>
              <span class="shoes"><span class="sr-only">Skor runt om</span></span>
            </div>
            <div role="row" class="startlist-row scratched">
              <span>3</span><span>Hail Mary</span><span>Struken</span>
              <span>8,5%</span><span>7,10</span>
            </div>
            <div role="row"><span>Summa V75</span><span>100%</span></div>
            <div role="row"><span>reklam</span></div>
          </div>
        </body></html>
    "#;

    fn extract(html: &str) -> Extraction {
        EntrantExtractor::new("V75").extract(html)
    }

    #[test]
    fn test_extracts_entrant_rows_in_display_order() {
        let extraction = extract(START_LIST);
        let names: Vec<&str> = extraction.entrants.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Global Badman", "Don Fanucci Zet", "Hail Mary"]);
        // header, summary and ad rows
        assert_eq!(extraction.dropped_rows, 3);
    }

    #[test]
    fn test_numbers_are_positional() {
        let extraction = extract(START_LIST);
        for (i, entrant) in extraction.entrants.iter().enumerate() {
            assert_eq!(entrant.number, i as u32 + 1);
            assert_eq!(entrant.track, i as u32 + 1);
            assert_eq!(entrant.driver_name, format!("Driver {}", i + 1));
        }
    }

    #[test]
    fn test_market_fields() {
        let extraction = extract(START_LIST);
        let first = &extraction.entrants[0];
        assert_eq!(first.v75_percent, 23.5);
        assert_eq!(first.trend_percent, 2.1);
        assert_eq!(first.win_odds, 3.45);
        assert_eq!(first.place_odds, 1.2);
        assert_eq!(first.record_time, "1.11,2a");
        assert_eq!(first.prize_money, 1_234_500);
        assert_eq!(first.equipment, Equipment::BareFrontShodRear);
        assert!(!first.scratched);

        let second = &extraction.entrants[1];
        assert_eq!(second.v75_percent, 41.0);
        assert_eq!(second.trend_percent, 0.0);
        assert_eq!(second.win_odds, 12.8);
        assert_eq!(second.place_odds, NO_QUOTE_ODDS);
        assert_eq!(second.equipment, Equipment::Shod);
    }

    #[test]
    fn test_falling_trend_keeps_its_sign() {
        let html = r#"<div role="row">
            <span>Global Badman</span><span>23,5%</span><span>-4,2%</span><span>3,45</span>
        </div>
        <div role="row">
            <span>Ego Boy</span><span>12%</span><span>−0,8 %</span>
        </div>"#;
        let extraction = extract(html);
        assert_eq!(extraction.entrants[0].v75_percent, 23.5);
        assert_eq!(extraction.entrants[0].trend_percent, -4.2);
        assert_eq!(extraction.entrants[0].win_odds, 3.45);
        assert_eq!(extraction.entrants[1].v75_percent, 12.0);
        assert_eq!(extraction.entrants[1].trend_percent, -0.8);
        assert_eq!(extraction.entrants[1].win_odds, NO_QUOTE_ODDS);
    }

    #[test]
    fn test_sign_attached_to_word_is_not_negative() {
        assert_eq!(percentages("Ego Boy-4,2% 5%"), vec![4.2, 5.0]);
        assert_eq!(percentages("(-1,5%) +2%"), vec![-1.5, 2.0]);
    }

    #[test]
    fn test_scratched_entrant_has_no_market_data() {
        let extraction = extract(START_LIST);
        let scratched = &extraction.entrants[2];
        assert!(scratched.scratched);
        assert_eq!(scratched.v75_percent, 0.0);
        assert_eq!(scratched.win_odds, NO_QUOTE_ODDS);
        assert_eq!(scratched.place_odds, NO_QUOTE_ODDS);
        assert!(extraction.entrants.iter().all(|e| e.satisfies_scratch_invariant()));
    }

    #[test]
    fn test_name_length_bounds() {
        let html = r#"<table><tbody>
            <tr><td>Ab C</td><td>5,00</td></tr>
            <tr><td>Abcdefghij Klmnopqrst Uvwxyzabcde</td></tr>
            <tr><td>Ace Of Spades</td></tr>
        </tbody></table>"#;
        let extraction = extract(html);
        assert_eq!(extraction.entrants.len(), 2);
        assert_eq!(extraction.entrants[0].name, "Ab C");
        assert_eq!(extraction.entrants[1].name, "Ace Of Spades");
        assert_eq!(extraction.entrants[1].number, 2);
    }

    #[test]
    fn test_nested_rows_use_innermost() {
        let html = r#"<div role="row"><div class="HorseRow"><span>Ego Boy</span><span>2,50</span></div></div>"#;
        let extraction = extract(html);
        assert_eq!(extraction.entrants.len(), 1);
        assert_eq!(extraction.entrants[0].win_odds, 2.5);
    }

    #[test]
    fn test_malformed_markup_never_panics() {
        let extraction = extract("<div role='row'><span>%%% ,,, 1.</span><tr><td>");
        assert!(extraction.entrants.is_empty());
        let extraction = extract("");
        assert!(extraction.entrants.is_empty());
    }

    #[test]
    fn test_division_meta() {
        let meta = EntrantExtractor::new("V75").division_meta(START_LIST);
        assert_eq!(meta.title, "V75-1 Bronsdivisionen, 2140 m Autostart");
        assert_eq!(meta.distance, "2140 m");
    }

    #[test]
    fn test_page_without_rows() {
        let extraction = extract("<html><body><p>Inga startlistor</p></body></html>");
        assert!(extraction.entrants.is_empty());
        assert_eq!(extraction.dropped_rows, 0);
    }
}
