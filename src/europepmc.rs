//! EuropePMC REST search client.
//!
//! Pages through `/search` one page at a time until a page comes back empty.
//! Query variants from the configuration are tried in order and the first one
//! that yields any new record ends the search.
//!
//! Records are de-duplicated by their EuropePMC `id`: the first record seen
//! with a given id is kept and later ones are dropped.

use crate::config::EuropePmcConfig;
use crate::error::{RegistryError, Result};
use crate::fetch::{build_client, get_text, Fetched};
use crate::normalize::{RawFields, RawRecord};
use crate::publication::Source;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// One entry of `resultList.result`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EuropePmcRecord {
    pub id: Option<String>,
    pub title: Option<String>,
    pub author_string: Option<String>,
    pub journal_title: Option<String>,
    pub pub_year: Option<String>,
    pub first_publication_date: Option<String>,
    pub doi: Option<String>,
}

impl RawRecord for EuropePmcRecord {
    const SOURCE: Source = Source::EuropePmc;

    fn raw_fields(&self) -> RawFields {
        // firstPublicationDate, else the bare year
        let date = self
            .first_publication_date
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.pub_year.clone());

        RawFields {
            title: self.title.clone(),
            authors: self.author_string.clone(),
            journal: self.journal_title.clone(),
            date: date.into(),
            doi: self.doi.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EuropePmcRecord>,
}

pub struct EuropePmcClient {
    client: Client,
    config: EuropePmcConfig,
}

impl EuropePmcClient {
    pub fn new(config: EuropePmcConfig) -> Result<Self> {
        let client = build_client(config.timeout(), None)?;
        Ok(Self { client, config })
    }

    fn search_url(&self, query: &str, page: u32) -> Result<Url> {
        let base = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("query", query.to_string()),
                ("format", "json".to_string()),
                ("pageSize", self.config.page_size.to_string()),
                ("page", page.to_string()),
                ("sort", "FIRST_PDATE desc".to_string()),
            ],
        )
        .map_err(|e| RegistryError::Config(format!("Invalid EuropePMC base URL: {}", e)))
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<EuropePmcRecord>> {
        let url = self.search_url(query, page)?;
        debug!(url = %url, page = page, "Fetching EuropePMC page");
        let body = get_text(&self.client, url.as_str(), self.config.max_retries).await?;
        let response: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| RegistryError::Parse(format!("Failed to parse EuropePMC response: {}", e)))?;
        Ok(response.result_list.result)
    }

    /// Page through one query. Returns the number of new records.
    ///
    /// A failing page ends this query; records gathered so far stay in `out`.
    async fn fetch_query(
        &self,
        query: &str,
        seen: &mut HashSet<String>,
        out: &mut Fetched<EuropePmcRecord>,
    ) -> usize {
        let mut page = 1;
        let mut total_new = 0;

        loop {
            let results = match self.fetch_page(query, page).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(page = page, error = %e, "EuropePMC page failed, keeping partial results");
                    out.failures.push(e);
                    break;
                }
            };

            if results.is_empty() {
                debug!(page = page, "No more EuropePMC records");
                break;
            }

            let count = results.len();
            let mut new = 0;
            for record in results {
                let Some(id) = record.id.clone().filter(|id| !id.is_empty()) else {
                    debug!(title = ?record.title, "Dropping EuropePMC record without id");
                    continue;
                };
                if seen.insert(id) {
                    out.records.push(record);
                    new += 1;
                }
            }

            info!(page = page, results = count, new = new, "EuropePMC page");
            total_new += new;

            // A page of nothing but repeats ends the query, even if a later
            // page would still carry new ids.
            if new == 0 {
                break;
            }
            page += 1;
        }

        total_new
    }

    /// Fetch all records for the configured query variants.
    pub async fn fetch(&self) -> Fetched<EuropePmcRecord> {
        let mut out = Fetched::default();
        let mut seen = HashSet::new();

        for template in &self.config.queries {
            let query = self.config.render_query(template);
            info!(query = %query, "Starting EuropePMC query");

            let new = self.fetch_query(&query, &mut seen, &mut out).await;
            info!(query = %query, new = new, "EuropePMC query complete");

            if new > 0 {
                break;
            }
        }

        info!(
            total = out.records.len(),
            partial = out.is_partial(),
            "EuropePMC fetch complete"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, Normalized};
    use mockito::{Matcher, Server};

    fn config(base_url: &str, queries: &[&str]) -> EuropePmcConfig {
        EuropePmcConfig {
            base_url: base_url.to_string(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            page_size: 2,
            timeout_secs: 5,
            max_retries: 0,
            ..Default::default()
        }
    }

    fn page_body(records: &[(&str, &str)]) -> String {
        let result: Vec<_> = records
            .iter()
            .map(|(id, title)| {
                serde_json::json!({
                    "id": id,
                    "title": title,
                    "authorString": "Doe J.",
                    "journalTitle": "Cell Stem Cell",
                    "pubYear": "2023",
                    "firstPublicationDate": "2023-05-12",
                    "doi": format!("10.1000/{}", id)
                })
            })
            .collect();
        serde_json::json!({ "resultList": { "result": result } }).to_string()
    }

    #[test]
    fn test_search_url() {
        let client = EuropePmcClient::new(config("https://example.org/rest/", &[])).unwrap();
        let url = client.search_url("AFF:\"UCPH\"", 3).unwrap();
        assert!(url.as_str().starts_with("https://example.org/rest/search?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("query".to_string(), "AFF:\"UCPH\"".to_string())));
        assert!(pairs.contains(&("page".to_string(), "3".to_string())));
        assert!(pairs.contains(&("format".to_string(), "json".to_string())));
    }

    #[test]
    fn test_raw_fields_date_fallback() {
        let record = EuropePmcRecord {
            title: Some("T".to_string()),
            pub_year: Some("2021".to_string()),
            first_publication_date: Some("".to_string()),
            ..Default::default()
        };
        match normalize(&record) {
            Normalized::Accepted(p) => assert_eq!(p.date, "2021"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paginates_until_empty_and_dedupes() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(page_body(&[("1", "First"), ("2", "Second")]))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(page_body(&[("2", "Second again"), ("3", "Third")]))
            .create_async()
            .await;
        let _p3 = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "3".into()))
            .with_status(200)
            .with_body(page_body(&[]))
            .create_async()
            .await;

        let client = EuropePmcClient::new(config(&server.url(), &["q"])).unwrap();
        let fetched = client.fetch().await;

        assert!(!fetched.is_partial());
        let titles: Vec<_> = fetched
            .records
            .iter()
            .map(|r| r.title.clone().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_page_failure_keeps_partial_batch() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(page_body(&[("1", "First")]))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(500)
            .create_async()
            .await;

        let client = EuropePmcClient::new(config(&server.url(), &["q"])).unwrap();
        let fetched = client.fetch().await;

        assert!(fetched.is_partial());
        assert_eq!(fetched.records.len(), 1);
    }

    /// Serves `first` once, then accepts connections without ever answering.
    async fn stalls_after_first_page(first: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut pending = Some(first);
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                match pending.take() {
                    Some(body) => {
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    None => held.push(socket),
                }
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_timeout_keeps_earlier_pages() {
        let base_url = stalls_after_first_page(page_body(&[("1", "First"), ("2", "Second")])).await;
        let client = EuropePmcClient::new(EuropePmcConfig {
            timeout_secs: 1,
            ..config(&base_url, &["q"])
        })
        .unwrap();

        let fetched = client.fetch().await;

        assert!(fetched.is_partial());
        assert!(matches!(&fetched.failures[0], RegistryError::Network(e) if e.is_timeout()));
        let ids: Vec<_> = fetched.records.iter().filter_map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_variant() {
        let mut server = Server::new_async().await;
        let _empty = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("query".into(), "first".into()))
            .with_status(200)
            .with_body(page_body(&[]))
            .create_async()
            .await;
        let _hit = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "second".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(page_body(&[("9", "Found")]))
            .create_async()
            .await;
        let _done = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "second".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(page_body(&[]))
            .create_async()
            .await;
        let third = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("query".into(), "third".into()))
            .expect(0)
            .create_async()
            .await;

        let client =
            EuropePmcClient::new(config(&server.url(), &["first", "second", "third"])).unwrap();
        let fetched = client.fetch().await;

        assert_eq!(fetched.records.len(), 1);
        third.assert_async().await;
    }
}
