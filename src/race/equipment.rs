//! Shoe configuration normalization
//!
//! The start list shows shoes as text, tooltips, hidden captions or bare
//! icons depending on the site revision. Everything ends up in
//! [`normalize`], which folds the wording onto an [`Equipment`] code.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::debug;

use super::types::Equipment;

const BARE_FRONT: &[&str] = &["barfota fram", "barefoot front"];
const SHOD_REAR: &[&str] = &["skor bak", "skodd bak", "shod rear", "shod behind"];
const SHOD_FRONT: &[&str] = &["skor fram", "skodd fram", "shod front"];
const BARE_REAR: &[&str] = &["barfota bak", "barefoot rear", "barefoot behind"];
const BARE_ALL: &[&str] = &[
    "barfota runt om",
    "barfota runtom",
    "barfota alla",
    "barefoot all round",
    "barefoot allround",
    "barefoot everywhere",
];
const SHOD_ALL: &[&str] = &[
    "skor runt om",
    "skor runtom",
    "skor alla",
    "skodd runt om",
    "shod all round",
    "shod allround",
    "shod everywhere",
];
const BARE: &[&str] = &["barfota", "barefoot"];
const SHOD: &[&str] = &["skor", "skodd", "shod"];

fn mentions(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| text.contains(term))
}

/// Lowercase, fold `-`/`_` to spaces and collapse whitespace.
fn fold(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a free-text shoe description to a code. First matching rule wins;
/// ambiguous text resolves by rule order alone.
pub fn normalize(raw: &str) -> Equipment {
    let text = fold(raw);
    if text.is_empty() {
        return Equipment::Unknown;
    }

    if mentions(&text, BARE_FRONT) && mentions(&text, SHOD_REAR) {
        return Equipment::BareFrontShodRear;
    }
    if mentions(&text, SHOD_FRONT) && mentions(&text, BARE_REAR) {
        return Equipment::ShodFrontBareRear;
    }
    if mentions(&text, BARE_ALL) {
        return Equipment::Barefoot;
    }
    if mentions(&text, SHOD_ALL) {
        return Equipment::Shod;
    }

    let bare = mentions(&text, BARE);
    let shod = mentions(&text, SHOD);
    match (bare, shod) {
        (true, false) => Equipment::Barefoot,
        (false, true) => Equipment::Shod,
        _ => Equipment::Unknown,
    }
}

pub fn normalize_opt(raw: Option<&str>) -> Equipment {
    raw.map(normalize).unwrap_or_default()
}

// ----------------------------------------------------------------------------
// DOM signals
// ----------------------------------------------------------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

/// Where a row keeps its shoe information.
static EQUIPMENT_ELEMENT: Lazy<Selector> = Lazy::new(|| {
    selector(
        "[class*='shoe'], [class*='Shoe'], [data-test-id*='shoe'], \
         [class*='equipment'], [class*='Equipment'], [data-test-id*='equipment']",
    )
});
static CAPTION: Lazy<Selector> =
    Lazy::new(|| selector("figcaption, caption, [class*='caption'], [class*='Caption'], [role='tooltip']"));
static SCREEN_READER: Lazy<Selector> = Lazy::new(|| {
    selector(".sr-only, .visually-hidden, [class*='srOnly'], [class*='sr-only'], [class*='visuallyHidden']")
});
static ICON: Lazy<Selector> =
    Lazy::new(|| selector("svg, i, img, [class*='icon'], [class*='Icon']"));

/// One way of reading the shoe configuration off an element.
pub struct EquipmentSignal {
    pub name: &'static str,
    pub read: fn(ElementRef<'_>) -> Option<Equipment>,
}

/// Signals in priority order.
pub const SIGNALS: &[EquipmentSignal] = &[
    EquipmentSignal { name: "aria-label", read: aria_label },
    EquipmentSignal { name: "title", read: title_attr },
    EquipmentSignal { name: "caption", read: caption },
    EquipmentSignal { name: "screen-reader", read: screen_reader_text },
    EquipmentSignal { name: "inner-text", read: inner_text },
    EquipmentSignal { name: "icon-classes", read: icon_classes },
];

fn known(code: Equipment) -> Option<Equipment> {
    code.is_known().then_some(code)
}

fn attr_signal(el: ElementRef<'_>, attr: &str) -> Option<Equipment> {
    std::iter::once(el)
        .chain(el.descendants().filter_map(ElementRef::wrap))
        .filter_map(|e| e.value().attr(attr))
        .map(normalize)
        .find(Equipment::is_known)
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn aria_label(el: ElementRef<'_>) -> Option<Equipment> {
    attr_signal(el, "aria-label")
}

fn title_attr(el: ElementRef<'_>) -> Option<Equipment> {
    attr_signal(el, "title")
}

fn caption(el: ElementRef<'_>) -> Option<Equipment> {
    el.select(&CAPTION)
        .map(|c| normalize(&text_of(c)))
        .find(Equipment::is_known)
}

fn screen_reader_text(el: ElementRef<'_>) -> Option<Equipment> {
    el.select(&SCREEN_READER)
        .map(|c| normalize(&text_of(c)))
        .find(Equipment::is_known)
}

fn inner_text(el: ElementRef<'_>) -> Option<Equipment> {
    known(normalize(&text_of(el)))
}

fn is_barefoot_icon(icon: ElementRef<'_>) -> bool {
    let class = icon.value().attr("class").unwrap_or_default().to_lowercase();
    class.contains("barefoot") || class.contains("barfota")
}

/// Two icons read as front then rear; a single icon covers all four hooves.
fn icon_classes(el: ElementRef<'_>) -> Option<Equipment> {
    let icons: Vec<ElementRef<'_>> = el.select(&ICON).collect();
    match icons.as_slice() {
        [front, rear] => Some(Equipment::from_front_rear(
            is_barefoot_icon(*front),
            is_barefoot_icon(*rear),
        )),
        [only] => Some(if is_barefoot_icon(*only) {
            Equipment::Barefoot
        } else {
            Equipment::Shod
        }),
        _ => None,
    }
}

/// Resolve an entrant row's shoe configuration, trying each signal on the
/// row's equipment element in priority order.
pub fn resolve_row(row: ElementRef<'_>) -> Equipment {
    row.select(&EQUIPMENT_ELEMENT)
        .find_map(resolve_element)
        .unwrap_or_default()
}

pub fn resolve_element(el: ElementRef<'_>) -> Option<Equipment> {
    SIGNALS.iter().find_map(|signal| {
        let code = (signal.read)(el)?;
        debug!("Equipment {} via {}", code, signal.name);
        Some(code)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first(html: &Html, css: &str) -> Option<Equipment> {
        let sel = Selector::parse(css).unwrap();
        let el = html.select(&sel).next().unwrap();
        resolve_element(el)
    }

    #[test]
    fn test_swedish_resolution_order() {
        assert_eq!(normalize("barfota fram, skor bak"), Equipment::BareFrontShodRear);
        assert_eq!(normalize("Skor fram, barfota bak"), Equipment::ShodFrontBareRear);
        assert_eq!(normalize("skor runt om"), Equipment::Shod);
        assert_eq!(normalize("Barfota runt om"), Equipment::Barefoot);
        assert_eq!(normalize("barfota"), Equipment::Barefoot);
        assert_eq!(normalize("  skor "), Equipment::Shod);
    }

    #[test]
    fn test_english_phrasing() {
        assert_eq!(normalize("Barefoot-front, shod-rear"), Equipment::BareFrontShodRear);
        assert_eq!(normalize("shod_front barefoot_rear"), Equipment::ShodFrontBareRear);
        assert_eq!(normalize("barefoot everywhere"), Equipment::Barefoot);
        assert_eq!(normalize("Shod all-round"), Equipment::Shod);
    }

    #[test]
    fn test_empty_and_missing_are_unknown() {
        assert_eq!(normalize(""), Equipment::Unknown);
        assert_eq!(normalize("   "), Equipment::Unknown);
        assert_eq!(normalize_opt(None), Equipment::Unknown);
        assert_eq!(normalize("vagn: amerikansk"), Equipment::Unknown);
    }

    #[test]
    fn test_ambiguous_text_resolves_by_rule_order() {
        // Rule 1 beats rule 3 even though "barfota runt om" is also present.
        assert_eq!(
            normalize("barfota fram skor bak (tidigare barfota runt om)"),
            Equipment::BareFrontShodRear
        );
        // Both bare terms without a front/rear pairing matches neither rule 5 nor 6.
        assert_eq!(normalize("barfota fram, skor fram"), Equipment::Unknown);
    }

    #[test]
    fn test_aria_label_wins_over_inner_text() {
        let html = Html::parse_fragment(
            r#"<span class="shoes" aria-label="Barfota fram och skor bak">skor</span>"#,
        );
        assert_eq!(first(&html, ".shoes"), Some(Equipment::BareFrontShodRear));
    }

    #[test]
    fn test_title_on_descendant() {
        let html = Html::parse_fragment(
            r#"<div class="shoes"><span title="barfota runt om"></span></div>"#,
        );
        assert_eq!(first(&html, ".shoes"), Some(Equipment::Barefoot));
    }

    #[test]
    fn test_screen_reader_text() {
        let html = Html::parse_fragment(
            r#"<div class="shoes"><span class="sr-only">Skor runt om</span></div>"#,
        );
        assert_eq!(first(&html, ".shoes"), Some(Equipment::Shod));
    }

    #[test]
    fn test_two_icons_read_front_then_rear() {
        let html = Html::parse_fragment(
            r#"<div class="shoes"><i class="icon-shoe"></i><i class="icon-barefoot"></i></div>"#,
        );
        assert_eq!(first(&html, ".shoes"), Some(Equipment::ShodFrontBareRear));
    }

    #[test]
    fn test_single_icon_by_class_name() {
        let html = Html::parse_fragment(
            r#"<div class="shoes"><svg class="Barfota-icon"></svg></div>"#,
        );
        assert_eq!(first(&html, ".shoes"), Some(Equipment::Barefoot));

        let html = Html::parse_fragment(r#"<div class="shoes"><svg class="horseshoe"></svg></div>"#);
        assert_eq!(first(&html, ".shoes"), Some(Equipment::Shod));
    }

    #[test]
    fn test_row_without_equipment_element_is_unknown() {
        let html = Html::parse_fragment(r#"<div class="row">Ego Boy 12,5%</div>"#);
        let sel = Selector::parse(".row").unwrap();
        let row = html.select(&sel).next().unwrap();
        assert_eq!(resolve_row(row), Equipment::Unknown);
    }
}
