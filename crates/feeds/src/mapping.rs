//! Mapping CSV headers onto a feed's column roles.
//!
//! Suggestions are advisory. A role whose configured header exists in the
//! CSV is never touched, and a role with no plausible header keeps whatever
//! it had, even when that header is absent from the file.

use crate::error::{ErrorKind, Result, SampleResultExt};
use crate::model::{Columns, Delimiter, Role};
use feedman_sample::{CsvSample, Sampler};
use tracing::debug;

const IDENTIFIER_HINTS: [&str; 2] = ["sku", "code"];
const QUANTITY_HINTS: [&str; 4] = ["pocet", "qty", "quantity", "stock"];

fn hints(role: Role) -> &'static [&'static str] {
    match role {
        Role::Identifier => &IDENTIFIER_HINTS,
        Role::Quantity => &QUANTITY_HINTS,
    }
}

fn guess<S: AsRef<str>>(headers: &[S], role: Role) -> Option<&str> {
    headers.iter().map(|header| header.as_ref()).find(|header| {
        let lower = header.to_lowercase();
        hints(role).iter().any(|hint| lower.contains(hint))
    })
}

/// Columns with each unresolved role replaced by the first header that looks
/// like it.
pub fn suggest_mappings<S: AsRef<str>>(headers: &[S], current: &Columns) -> Columns {
    let mut suggested = current.clone();
    for role in [Role::Identifier, Role::Quantity] {
        if headers.iter().any(|header| header.as_ref() == current.get(role)) {
            continue;
        }
        if let Some(header) = guess(headers, role) {
            debug!(%role, header, "suggesting column");
            suggested.assign(role, header);
        }
    }
    suggested
}

/// A CSV header and the roles it is mapped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    pub header: String,
    pub roles: Vec<Role>,
}

impl HeaderMapping {
    pub fn is_mapped(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// One entry per header, in header order.
pub fn annotate<S: AsRef<str>>(headers: &[S], columns: &Columns) -> Vec<HeaderMapping> {
    headers
        .iter()
        .map(|header| HeaderMapping { header: header.as_ref().to_string(), roles: columns.roles_of(header.as_ref()) })
        .collect()
}

/// Configured roles whose header does not appear in `headers`.
pub fn unresolved<S: AsRef<str>>(headers: &[S], columns: &Columns) -> Vec<Role> {
    [Role::Identifier, Role::Quantity]
        .into_iter()
        .filter(|role| !headers.iter().any(|header| header.as_ref() == columns.get(*role)))
        .collect()
}

/// A sampled CSV with the current and suggested column mappings.
#[derive(Debug, Clone)]
pub struct Preview {
    pub sample: CsvSample,
    /// Mapping of each header under the columns the preview was taken with.
    pub mappings: Vec<HeaderMapping>,
    pub suggested: Columns,
}

/// Sample `url` and work out how its headers line up with `columns`.
pub async fn preview(
    sampler: &Sampler,
    url: &str,
    delimiter: Delimiter,
    columns: &Columns,
    max_rows: usize,
) -> Result<Preview> {
    let url = url.trim();
    if url.is_empty() {
        exn::bail!(ErrorKind::Validation("CSV URL is empty".to_string()));
    }
    let sample = sampler.sample(url, delimiter, max_rows).await.or_sample()?;
    let mappings = annotate(&sample.headers, columns);
    let suggested = suggest_mappings(&sample.headers, columns);
    Ok(Preview { sample, mappings, suggested })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn columns(identifier: &str, quantity: &str) -> Columns {
        Columns { identifier: identifier.to_string(), quantity: quantity.to_string() }
    }

    #[rstest]
    #[case(&["Code", "Qty"], ("Code", "Qty"), ("Code", "Qty"))]
    #[case(&["ProductCode", "StockQty"], ("SKU", "Pocet_ks"), ("ProductCode", "StockQty"))]
    #[case(&["Foo", "Bar"], ("SKU", "Pocet_ks"), ("SKU", "Pocet_ks"))]
    #[case(&["SKU", "Pocet_ks"], ("SKU", "Pocet_ks"), ("SKU", "Pocet_ks"))]
    #[case(&["Nazov", "SKU_dodavatel", "Stav_skladu", "POCET"], ("Kod", "Mnozstvo"), ("SKU_dodavatel", "POCET"))]
    #[case(&["ean_code", "in_stock", "qty"], ("SKU", "qty"), ("ean_code", "qty"))]
    #[case(&["Code", "Quantity"], ("SKU", "Pocet_ks"), ("Code", "Quantity"))]
    fn suggestions(
        #[case] headers: &[&str],
        #[case] current: (&str, &str),
        #[case] expected: (&str, &str),
    ) {
        let suggested = suggest_mappings(headers, &columns(current.0, current.1));
        assert_eq!(suggested, columns(expected.0, expected.1));
    }

    #[test]
    fn first_matching_header_wins_over_hint_order() {
        // "Stock" matches a later hint than "Pocet" but comes first in the file.
        let suggested = suggest_mappings(&["Stock", "Pocet"], &Columns::default());
        assert_eq!(suggested.quantity, "Stock");
    }

    #[test]
    fn a_header_may_be_suggested_for_both_roles() {
        let suggested = suggest_mappings(&["sku_stock"], &columns("a", "b"));
        assert_eq!(suggested, columns("sku_stock", "sku_stock"));
    }

    #[test]
    fn no_headers_changes_nothing() {
        let empty: [&str; 0] = [];
        assert_eq!(suggest_mappings(&empty, &Columns::default()), Columns::default());
    }

    #[test]
    fn annotation_follows_header_order() {
        let mappings = annotate(&["Nazov", "SKU", "Pocet_ks"], &Columns::default());
        let roles: Vec<_> = mappings.iter().map(|m| (m.header.as_str(), m.roles.clone())).collect();
        assert_eq!(
            roles,
            vec![("Nazov", vec![]), ("SKU", vec![Role::Identifier]), ("Pocet_ks", vec![Role::Quantity])]
        );
        assert!(!mappings[0].is_mapped());
    }

    #[test]
    fn unresolved_roles() {
        assert_eq!(unresolved(&["SKU", "Stav"], &Columns::default()), vec![Role::Quantity]);
        assert!(unresolved(&["Pocet_ks", "SKU"], &Columns::default()).is_empty());
    }

    #[tokio::test]
    async fn preview_requires_a_url() {
        let sampler = Sampler::new().unwrap();
        let err = preview(&sampler, "  ", Delimiter::Semicolon, &Columns::default(), 5).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }
}
