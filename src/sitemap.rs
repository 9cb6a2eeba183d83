//! Parse sitemap.xml and sitemap index files.

use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Conventional sitemap locations, probed in order when a page declares none.
pub const SITEMAP_PROBE_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap/sitemap.xml"];

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// A parsed sitemap document. An index file yields `children` and no entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sitemap {
    pub entries: Vec<SitemapEntry>,
    pub children: Vec<String>,
}

pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Sitemap::default();

    let mut in_url = false;
    let mut in_sitemap = false;
    let mut current_tag = String::new();
    let mut current_loc = String::new();
    let mut current_lastmod = String::new();

    loop {
        let text = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" => {
                        in_url = true;
                        current_loc.clear();
                        current_lastmod.clear();
                    }
                    "sitemap" => {
                        in_sitemap = true;
                        current_loc.clear();
                    }
                    _ => current_tag = name,
                }
                None
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" if in_url => {
                        if !current_loc.is_empty() {
                            out.entries.push(SitemapEntry {
                                loc: current_loc.clone(),
                                lastmod: parse_date(&current_lastmod),
                            });
                        }
                        in_url = false;
                    }
                    "sitemap" if in_sitemap => {
                        if !current_loc.is_empty() {
                            out.children.push(current_loc.clone());
                        }
                        in_sitemap = false;
                    }
                    _ => {}
                }
                current_tag.clear();
                None
            }
            Ok(Event::Text(e)) => Some(e.unescape().unwrap_or_default().to_string()),
            Ok(Event::CData(e)) => Some(String::from_utf8_lossy(e.as_ref()).to_string()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("XML parse error: {e}")),
            _ => None,
        };

        if let Some(text) = text {
            if (in_url || in_sitemap) && current_tag == "loc" {
                current_loc = text.trim().to_string();
            } else if in_url && current_tag == "lastmod" {
                current_lastmod = text.trim().to_string();
            }
        }
        buf.clear();
    }

    Ok(out)
}

/// Lenient date parsing for sitemap, meta tag and header values.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    // date-only, possibly followed by a time we could not read
    let date_part = s.get(..10).unwrap_or(s);
    chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url>
            <loc>https://example.com/</loc>
          </url>
          <url>
            <loc>https://example.com/about</loc>
            <lastmod>2024-01-15</lastmod>
          </url>
          <url>
            <loc><![CDATA[https://example.com/blog/post-1]]></loc>
            <lastmod>2024-03-02T10:00:00+00:00</lastmod>
          </url>
        </urlset>"#;

        let sitemap = parse_sitemap(xml).unwrap();
        assert!(sitemap.children.is_empty());
        assert_eq!(sitemap.entries.len(), 3);
        assert_eq!(sitemap.entries[0].loc, "https://example.com/");
        assert!(sitemap.entries[0].lastmod.is_none());
        assert_eq!(sitemap.entries[1].lastmod.unwrap().day(), 15);
        assert_eq!(sitemap.entries[2].loc, "https://example.com/blog/post-1");
        assert_eq!(sitemap.entries[2].lastmod.unwrap().month(), 3);
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://example.com/sitemap-posts.xml</loc><lastmod>2024-01-01</lastmod></sitemap>
          <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
        </sitemapindex>"#;

        let sitemap = parse_sitemap(xml).unwrap();
        assert!(sitemap.entries.is_empty());
        assert_eq!(
            sitemap.children,
            vec![
                "https://example.com/sitemap-posts.xml".to_string(),
                "https://example.com/sitemap-pages.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-05-01").is_some());
        assert!(parse_date("2024-05-01T08:30:00Z").is_some());
        assert!(parse_date("Wed, 21 Oct 2015 07:28:00 GMT").is_some());
        assert!(parse_date("2024-05-01T08:30:00").is_some());
        assert!(parse_date("").is_none());
        assert!(parse_date("yesterday").is_none());
    }
}
