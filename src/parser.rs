use crate::types::{CollectorError, Item, Result};
use chrono::Utc;
use feed_rs::parser;
use scraper::Html;
use tracing::debug;

/// Strip markup from an HTML fragment and collapse whitespace.
pub fn clean_html(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(raw);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an RSS/Atom body into items for a topic, in feed order.
///
/// Summary and content come out markup-stripped. Entries without a link
/// or title still come through (with the field empty); deciding what to
/// do with an incomplete natural key belongs to the controller.
pub fn parse_feed(content: &str, topic: &str) -> Result<Vec<Item>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| CollectorError::Parse(format!("failed to parse feed: {e}")))?;

    let collected_at = Utc::now();
    let items: Vec<Item> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let summary = entry
                .summary
                .map(|s| clean_html(&s.content))
                .filter(|s| !s.is_empty());
            let content = entry
                .content
                .and_then(|c| c.body)
                .map(|body| clean_html(&body))
                .filter(|c| !c.is_empty());
            let author = entry
                .authors
                .first()
                .map(|a| a.name.clone())
                .filter(|a| !a.is_empty());
            let categories = entry.categories.into_iter().map(|c| c.term).collect();
            let image = entry
                .media
                .first()
                .and_then(|m| m.content.first())
                .and_then(|c| c.url.as_ref())
                .map(|u| u.to_string());

            Item {
                id: None,
                topic: topic.to_string(),
                title,
                link,
                summary,
                content,
                published: entry.published,
                author,
                categories,
                image,
                collected_at,
            }
        })
        .collect();

    debug!(topic, count = items.len(), "parsed feed entries");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_html_strips_tags_and_collapses_whitespace() {
        assert_eq!(
            clean_html("<p>Hello   <b>world</b></p>\n<p>again</p>"),
            "Hello world again"
        );
        assert_eq!(clean_html(""), "");
        assert_eq!(clean_html("plain text"), "plain text");
    }

    #[test]
    fn parse_feed_maps_entries_in_order() {
        let body = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example</title>
  <item>
    <title>First</title>
    <link>https://example.com/1</link>
    <description>&lt;p&gt;Summary one&lt;/p&gt;</description>
    <category>tech</category>
  </item>
  <item>
    <title>Second</title>
    <link>https://example.com/2</link>
  </item>
</channel></rss>"#;

        let items = parse_feed(body, "main").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First");
        assert_eq!(items[0].link, "https://example.com/1");
        assert_eq!(items[0].summary.as_deref(), Some("Summary one"));
        assert_eq!(items[0].categories, vec!["tech".to_string()]);
        assert_eq!(items[1].title, "Second");
        assert!(items[0].has_natural_key());
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(parse_feed("not xml at all", "main").is_err());
    }
}
