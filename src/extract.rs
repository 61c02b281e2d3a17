//! SERP markup extraction.
//!
//! Pure functions turning a rendered results page into the normalized
//! organic/sponsored schema. Selectors track the markup Google currently
//! ships; blocks that fail to parse are skipped with a diagnostic rather
//! than aborting the page.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
#[error("failed to parse page markup: {0}")]
pub struct ExtractError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sitelink {
    pub url: String,
    pub text: String,
}

/// An unpaid search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrganicEntry {
    pub position: u32,
    pub domain: String,
    pub title: String,
    /// Single-space placeholder when the page shows no snippet
    pub snippet: String,
    pub link: String,
    pub sitelinks: Vec<Sitelink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SponsoredSitelink {
    pub title: String,
    /// Always null; ad sitelinks carry no description
    pub description: Option<String>,
    pub link: String,
    pub tracking_link: Option<String>,
}

/// A paid result. All fields except position are optional; title, link,
/// tracking token and domain are an all-or-nothing group tied to the
/// presence of the primary link element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SponsoredEntry {
    pub position: u32,
    pub domain: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
    pub tracking_link: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Omitted entirely (not an empty list) when the ad has no sitelinks;
    /// presence of the field is meaningful downstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitelinks: Option<Vec<SponsoredSitelink>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, ToSchema)]
pub struct ExtractionResult {
    pub organic: Vec<OrganicEntry>,
    pub ads: Vec<SponsoredEntry>,
}

/// Extract the normalized result set from rendered SERP markup.
///
/// Deterministic for identical input. Individual blocks that cannot be
/// parsed are dropped; only input that is not a usable document at all
/// yields an error.
pub fn extract(html: &str) -> Result<ExtractionResult, ExtractError> {
    if html.trim().is_empty() {
        return Err(ExtractError("empty document".to_string()));
    }
    let document = Html::parse_document(html);
    Ok(ExtractionResult {
        organic: extract_organic(&document),
        ads: extract_sponsored(&document),
    })
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn host_of(link: &str) -> String {
    match url::Url::parse(link) {
        Ok(u) => u.host_str().unwrap_or("").to_string(),
        Err(_) => {
            warn!("could not parse result link for domain: {}", link);
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Organic results
// ---------------------------------------------------------------------------

fn extract_organic(document: &Html) -> Vec<OrganicEntry> {
    let block_sel = Selector::parse("div.MjjYud").unwrap();
    let sponsored_sel = Selector::parse("div.uEierd").unwrap();
    let link_sel = Selector::parse("a.zReHs").unwrap();
    let heading_sel = Selector::parse("h3.LC20lb").unwrap();
    let snippet_sel = Selector::parse("div.VwiC3b").unwrap();
    let sitelinks_list_sel = Selector::parse("div.HiHjCd, div.X7NTVe").unwrap();
    let sitelinks_table_sel = Selector::parse("table.jmjoTe").unwrap();
    let anchor_sel = Selector::parse("a[href]").unwrap();

    let mut entries = Vec::new();
    let mut seen_links: HashSet<String> = HashSet::new();
    // Position counter advances for every entry except one whose snippet
    // element is present but empty; those reuse the current value.
    let mut position = 0u32;

    for block in document.select(&block_sel) {
        // Ad blocks are handled by the sponsored pass
        if block.select(&sponsored_sel).next().is_some() {
            continue;
        }

        let Some(link) = block
            .select(&link_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
        else {
            continue;
        };
        if !seen_links.insert(link.to_string()) {
            continue;
        }

        let Some(heading) = block.select(&heading_sel).next() else {
            continue;
        };
        let title = text_of(&heading);

        let snippet = block.select(&snippet_sel).next().map(|el| text_of(&el));
        // The space placeholder for a missing snippet element counts as
        // snippet-bearing; only a present snippet that trims to nothing
        // fails to advance the counter.
        match &snippet {
            Some(s) if s.is_empty() => {}
            _ => position += 1,
        }
        let snippet = snippet.unwrap_or_else(|| " ".to_string());

        // Anchors are read from the first matching container only; the
        // tabular shape is consulted when that yields nothing.
        let mut sitelinks =
            sitelinks_in(block.select(&sitelinks_list_sel).next(), &anchor_sel);
        if sitelinks.is_empty() {
            sitelinks = sitelinks_in(block.select(&sitelinks_table_sel).next(), &anchor_sel);
        }

        entries.push(OrganicEntry {
            position,
            domain: host_of(link),
            title,
            snippet,
            link: link.to_string(),
            sitelinks,
        });
    }

    entries
}

fn sitelinks_in(container: Option<ElementRef>, anchor_sel: &Selector) -> Vec<Sitelink> {
    container
        .map(|c| {
            c.select(anchor_sel)
                .filter_map(|a| {
                    a.value().attr("href").map(|href| Sitelink {
                        url: href.to_string(),
                        text: text_of(&a),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sponsored results
// ---------------------------------------------------------------------------

fn extract_sponsored(document: &Html) -> Vec<SponsoredEntry> {
    let block_sel = Selector::parse("div.uEierd").unwrap();
    let source_sel = Selector::parse("div.Aozhyc.Sqrs4e.TElO2c.OSrXXb").unwrap();
    let link_sel = Selector::parse("a.sVXRqc").unwrap();
    let heading_sel = Selector::parse("div[role=\"heading\"]").unwrap();
    let description_sel = Selector::parse("div.p4wth").unwrap();
    let sublinks_sel = Selector::parse("div.dcuivd a").unwrap();

    let mut ads = Vec::new();
    let mut position = 0u32;

    for block in document.select(&block_sel) {
        // Every ad block consumes a position, complete or not
        position += 1;

        let source = block.select(&source_sel).next().map(|el| text_of(&el));

        let (title, tracking_link, link, domain) = match block.select(&link_sel).next() {
            Some(anchor) => {
                let title = anchor.select(&heading_sel).next().map(|el| text_of(&el));
                let tracking = anchor.value().attr("data-rw").map(|s| s.to_string());
                let href = anchor.value().attr("href").map(|s| s.to_string());
                let domain = href.as_deref().map(host_of);
                (title, tracking, href, domain)
            }
            None => (None, None, None, None),
        };

        let description = block.select(&description_sel).next().map(|el| text_of(&el));

        let sublinks: Vec<SponsoredSitelink> = block
            .select(&sublinks_sel)
            .filter_map(|a| {
                let title = text_of(&a);
                let href = a.value().attr("href")?;
                if title.is_empty() {
                    return None;
                }
                Some(SponsoredSitelink {
                    title,
                    description: None,
                    link: href.to_string(),
                    tracking_link: a.value().attr("data-rw").map(|s| s.to_string()),
                })
            })
            .collect();

        ads.push(SponsoredEntry {
            position,
            domain,
            source,
            link,
            tracking_link,
            title,
            description,
            sitelinks: if sublinks.is_empty() {
                None
            } else {
                Some(sublinks)
            },
        });
    }

    ads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn organic_block(link: &str, title: &str, snippet: Option<&str>) -> String {
        let snippet_html = snippet
            .map(|s| format!(r#"<div class="VwiC3b">{}</div>"#, s))
            .unwrap_or_default();
        format!(
            r#"<div class="MjjYud">
                 <a class="zReHs" href="{link}"><h3 class="LC20lb">{title}</h3></a>
                 {snippet_html}
               </div>"#
        )
    }

    fn page(body: &str) -> String {
        format!("<html><body>{}</body></html>", body)
    }

    #[test]
    fn test_organic_positions_sequential_in_document_order() {
        let html = page(&format!(
            "{}{}{}",
            organic_block("https://a.example.com/x", "A", Some("first")),
            organic_block("https://b.example.com/y", "B", Some("second")),
            organic_block("https://c.example.com/z", "C", Some("third")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic.len(), 3);
        let positions: Vec<u32> = result.organic.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(result.organic[0].title, "A");
        assert_eq!(result.organic[0].domain, "a.example.com");
        assert_eq!(result.organic[2].link, "https://c.example.com/z");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let html = page(&format!(
            "{}{}",
            organic_block("https://a.example.com", "A", Some("snippet a")),
            organic_block("https://b.example.com", "B", None),
        ));
        assert_eq!(extract(&html).unwrap(), extract(&html).unwrap());
    }

    #[test]
    fn test_duplicate_links_keep_first_only() {
        let html = page(&format!(
            "{}{}",
            organic_block("https://dup.example.com", "First", Some("kept")),
            organic_block("https://dup.example.com", "Second", Some("dropped")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic.len(), 1);
        assert_eq!(result.organic[0].title, "First");
    }

    #[test]
    fn test_block_without_link_or_heading_is_skipped() {
        let html = page(&format!(
            r#"<div class="MjjYud"><h3 class="LC20lb">No link</h3></div>
               <div class="MjjYud"><a class="zReHs" href="https://x.example.com">no heading</a></div>
               {}"#,
            organic_block("https://ok.example.com", "OK", Some("fine")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic.len(), 1);
        assert_eq!(result.organic[0].position, 1);
    }

    #[test]
    fn test_missing_snippet_uses_placeholder_and_still_advances_position() {
        let html = page(&format!(
            "{}{}{}",
            organic_block("https://a.example.com", "A", Some("has snippet")),
            organic_block("https://b.example.com", "B", None),
            organic_block("https://c.example.com", "C", Some("also has one")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic.len(), 3);
        assert_eq!(result.organic[1].snippet, " ");
        // The placeholder entry counts as snippet-bearing
        let positions: Vec<u32> = result.organic.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_snippet_element_does_not_advance_position() {
        let html = page(&format!(
            "{}{}{}",
            organic_block("https://a.example.com", "A", Some("first")),
            organic_block("https://b.example.com", "B", Some("   ")),
            organic_block("https://c.example.com", "C", Some("second")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic[1].snippet, "");
        // Known-odd numbering: the whitespace-only entry reuses the count
        let positions: Vec<u32> = result.organic.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 1, 2]);
    }

    #[test]
    fn test_block_containing_ad_marker_is_not_organic() {
        let html = page(&format!(
            r#"<div class="MjjYud">
                 <div class="uEierd"></div>
                 <a class="zReHs" href="https://ad.example.com"><h3 class="LC20lb">Ad</h3></a>
               </div>
               {}"#,
            organic_block("https://organic.example.com", "Organic", Some("real")),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic.len(), 1);
        assert_eq!(result.organic[0].domain, "organic.example.com");
    }

    #[test]
    fn test_unparsable_link_yields_empty_domain() {
        let html = page(&organic_block("/relative/path", "Rel", Some("s")));
        let result = extract(&html).unwrap();
        assert_eq!(result.organic[0].domain, "");
        assert_eq!(result.organic[0].link, "/relative/path");
    }

    #[test]
    fn test_sitelinks_from_list_container() {
        let html = page(
            r#"<div class="MjjYud">
                 <a class="zReHs" href="https://site.example.com"><h3 class="LC20lb">T</h3></a>
                 <div class="VwiC3b">snip</div>
                 <div class="HiHjCd">
                   <a href="https://site.example.com/one">One</a>
                   <a href="https://site.example.com/two">Two</a>
                 </div>
                 <table class="jmjoTe"><tr><td><a href="https://ignored.example.com">Ignored</a></td></tr></table>
               </div>"#,
        );
        let result = extract(&html).unwrap();
        let sitelinks = &result.organic[0].sitelinks;
        assert_eq!(sitelinks.len(), 2);
        assert_eq!(sitelinks[0].text, "One");
        assert_eq!(sitelinks[1].url, "https://site.example.com/two");
    }

    #[test]
    fn test_sitelinks_read_first_container_only() {
        let html = page(
            r#"<div class="MjjYud">
                 <a class="zReHs" href="https://site.example.com"><h3 class="LC20lb">T</h3></a>
                 <div class="VwiC3b">snip</div>
                 <div class="HiHjCd"><a href="https://site.example.com/one">One</a></div>
                 <div class="X7NTVe"><a href="https://site.example.com/other">Other</a></div>
               </div>"#,
        );
        let result = extract(&html).unwrap();
        let sitelinks = &result.organic[0].sitelinks;
        assert_eq!(sitelinks.len(), 1);
        assert_eq!(sitelinks[0].text, "One");
    }

    #[test]
    fn test_sitelinks_fall_back_to_table_container() {
        let html = page(
            r#"<div class="MjjYud">
                 <a class="zReHs" href="https://site.example.com"><h3 class="LC20lb">T</h3></a>
                 <div class="VwiC3b">snip</div>
                 <table class="jmjoTe"><tr><td><a href="https://site.example.com/tab">Tab</a></td></tr></table>
               </div>"#,
        );
        let result = extract(&html).unwrap();
        assert_eq!(result.organic[0].sitelinks.len(), 1);
        assert_eq!(result.organic[0].sitelinks[0].text, "Tab");
    }

    fn ad_block(link: Option<&str>, sublinks: &str) -> String {
        let anchor = link
            .map(|l| {
                format!(
                    r#"<a class="sVXRqc" href="{l}" data-rw="https://track.example.com/t">
                         <div role="heading">Ad Title</div>
                       </a>"#
                )
            })
            .unwrap_or_default();
        format!(
            r#"<div class="uEierd">
                 <div class="Aozhyc Sqrs4e TElO2c OSrXXb">Sponsor Inc</div>
                 {anchor}
                 <div class="p4wth">Buy things</div>
                 {sublinks}
               </div>"#
        )
    }

    #[test]
    fn test_sponsored_positions_count_every_block() {
        let html = page(&format!(
            "{}{}{}",
            ad_block(Some("https://one.example.com"), ""),
            ad_block(None, ""),
            ad_block(Some("https://three.example.com"), ""),
        ));
        let result = extract(&html).unwrap();
        assert_eq!(result.ads.len(), 3);
        let positions: Vec<u32> = result.ads.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_sponsored_missing_link_nulls_the_whole_group() {
        let html = page(&ad_block(None, ""));
        let ad = &extract(&html).unwrap().ads[0];
        assert!(ad.link.is_none());
        assert!(ad.title.is_none());
        assert!(ad.tracking_link.is_none());
        assert!(ad.domain.is_none());
        // Independent fields still extracted
        assert_eq!(ad.source.as_deref(), Some("Sponsor Inc"));
        assert_eq!(ad.description.as_deref(), Some("Buy things"));
    }

    #[test]
    fn test_sponsored_complete_entry() {
        let html = page(&ad_block(Some("https://shop.example.com/p"), ""));
        let ad = &extract(&html).unwrap().ads[0];
        assert_eq!(ad.title.as_deref(), Some("Ad Title"));
        assert_eq!(ad.domain.as_deref(), Some("shop.example.com"));
        assert_eq!(
            ad.tracking_link.as_deref(),
            Some("https://track.example.com/t")
        );
    }

    #[test]
    fn test_sponsored_sitelinks_presence_is_meaningful() {
        let with_subs = page(&ad_block(
            Some("https://shop.example.com"),
            r#"<div class="dcuivd">
                 <a href="https://shop.example.com/deal" data-rw="https://track.example.com/d">Deals</a>
                 <a href="https://shop.example.com/empty"></a>
               </div>"#,
        ));
        let without_subs = page(&ad_block(Some("https://shop.example.com"), ""));

        let ad = &extract(&with_subs).unwrap().ads[0];
        let subs = ad.sitelinks.as_ref().unwrap();
        // The sublink with no text is dropped
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].title, "Deals");
        assert!(subs[0].description.is_none());
        let json = serde_json::to_value(ad).unwrap();
        assert!(json.get("sitelinks").is_some());

        let ad = &extract(&without_subs).unwrap().ads[0];
        assert!(ad.sitelinks.is_none());
        let json = serde_json::to_value(ad).unwrap();
        assert!(json.get("sitelinks").is_none());
    }

    #[test]
    fn test_empty_input_is_an_extraction_error() {
        assert!(extract("").is_err());
        assert!(extract("   \n  ").is_err());
    }

    #[test]
    fn test_garbage_markup_degrades_to_empty_result() {
        let result = extract("<<<<not really markup>>>>").unwrap();
        assert!(result.organic.is_empty());
        assert!(result.ads.is_empty());
    }
}
