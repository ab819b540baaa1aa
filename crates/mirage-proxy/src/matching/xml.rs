//! Structural XML comparison and XPath extraction.

use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

/// Parse both documents and check that the expected element tree is contained
/// in the actual one. Whitespace-only text and child order are irrelevant;
/// attributes and children not named by `expected` are ignored.
pub fn xml_partial_match(expected: &str, actual: &str) -> bool {
    let Ok(expected_pkg) = parser::parse(expected) else {
        return false;
    };
    let Ok(actual_pkg) = parser::parse(actual) else {
        return false;
    };
    let expected_doc = expected_pkg.as_document();
    let actual_doc = actual_pkg.as_document();

    match (
        root_element(expected_doc.root().children()),
        root_element(actual_doc.root().children()),
    ) {
        (Some(e), Some(a)) => element_contains(a, e),
        _ => false,
    }
}

fn root_element(children: Vec<ChildOfRoot<'_>>) -> Option<Element<'_>> {
    children.into_iter().find_map(|c| match c {
        ChildOfRoot::Element(e) => Some(e),
        _ => None,
    })
}

fn child_elements(element: Element<'_>) -> Vec<Element<'_>> {
    element
        .children()
        .into_iter()
        .filter_map(|c| match c {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

fn text_of(element: Element<'_>) -> String {
    element
        .children()
        .into_iter()
        .filter_map(|c| match c {
            ChildOfElement::Text(t) => Some(t.text().to_string()),
            _ => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn element_contains(actual: Element<'_>, expected: Element<'_>) -> bool {
    if actual.name() != expected.name() {
        return false;
    }

    let attributes_match = expected
        .attributes()
        .into_iter()
        .all(|attr| actual.attribute_value(attr.name()) == Some(attr.value()));
    if !attributes_match {
        return false;
    }

    let expected_text = text_of(expected);
    if !expected_text.is_empty() && expected_text != text_of(actual) {
        return false;
    }

    let actual_children = child_elements(actual);
    let mut used = vec![false; actual_children.len()];
    child_elements(expected).into_iter().all(|ec| {
        let found = actual_children
            .iter()
            .enumerate()
            .find(|(i, ac)| !used[*i] && element_contains(**ac, ec))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Evaluate an XPath expression against an XML body.
///
/// Returns `None` when the body is not XML, the expression is invalid, the
/// node set is empty or the expression evaluates to `false`.
pub fn extract_xpath(body: &str, path: &str) -> Option<String> {
    use sxd_xpath::{evaluate_xpath, Value};

    let package = parser::parse(body).ok()?;
    let document = package.as_document();

    match evaluate_xpath(&document, path).ok()? {
        Value::String(s) => Some(s),
        Value::Number(n) => {
            if n.fract() == 0.0 {
                Some(format!("{}", n as i64))
            } else {
                Some(n.to_string())
            }
        }
        Value::Boolean(true) => Some("true".to_string()),
        Value::Boolean(false) => None,
        Value::Nodeset(nodes) => nodes.iter().next().map(|node| node.string_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_documents_ignore_whitespace() {
        let expected = "<order><id>1</id></order>";
        let actual = "<order>\n  <id>1</id>\n</order>";
        assert!(xml_partial_match(expected, actual));
    }

    #[test]
    fn test_subtree_match() {
        let expected = r#"<order><customer name="alice"/></order>"#;
        let actual = r#"<order id="9"><total>10</total><customer name="alice" tier="gold"/></order>"#;
        assert!(xml_partial_match(expected, actual));
    }

    #[test]
    fn test_mismatched_text_or_attribute() {
        assert!(!xml_partial_match("<a><b>1</b></a>", "<a><b>2</b></a>"));
        assert!(!xml_partial_match(r#"<a x="1"/>"#, r#"<a x="2"/>"#));
        assert!(!xml_partial_match("<a/>", "<b/>"));
    }

    #[test]
    fn test_invalid_xml() {
        assert!(!xml_partial_match("<a>", "<a/>"));
        assert!(!xml_partial_match("<a/>", "not xml"));
    }

    #[test]
    fn test_extract_xpath() {
        let xml = r#"<root><item id="123">Content</item><n>4</n></root>"#;
        assert_eq!(extract_xpath(xml, "/root/item"), Some("Content".to_string()));
        assert_eq!(extract_xpath(xml, "/root/item/@id"), Some("123".to_string()));
        assert_eq!(extract_xpath(xml, "count(/root/item)"), Some("1".to_string()));
        assert_eq!(extract_xpath(xml, "/root/missing"), None);
        assert_eq!(extract_xpath(xml, "/root/n = 5"), None);
        assert_eq!(extract_xpath("not xml", "/root"), None);
    }
}
