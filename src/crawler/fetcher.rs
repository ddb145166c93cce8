use crate::cache::{CacheLookup, CacheStore};
use crate::config::CatalogConfig;
use crate::crawler::models::{ListEnvelope, ListKind, MealsEnvelope, RawMeal};
use crate::error::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// HTTP client for the remote meal catalog.
///
/// Every GET is keyed in the response cache by its full URL. A cached body
/// that still parses is returned without touching the network; otherwise
/// the request is sent once, with no retries, under the configured timeout.
pub struct CatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
    cache: CacheStore,
    rate_limiter: RateLimiter,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, cache: CacheStore) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            cache,
            rate_limiter: RateLimiter::new(config.requests_per_second),
        })
    }

    /// Full request URL; this string is also the cache key
    pub fn request_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/{}", self.base_url, self.api_key, path))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// GET a JSON document, consulting the cache first
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.request_url(path, params)?;
        let key = url.as_str();

        match self.cache.get(key).await {
            CacheLookup::Hit(body) => match serde_json::from_str(&body) {
                Ok(value) => return Ok(value),
                Err(e) => debug!("Ignoring unparseable cached body for {}: {}", path, e),
            },
            CacheLookup::Miss | CacheLookup::Error(_) => {}
        }

        let body = self.fetch_body(&url, path).await?;
        let value = serde_json::from_str(&body)
            .map_err(|e| Error::Catalog(format!("Malformed body from {path}: {e}")))?;

        self.cache.put(key, &body).await;
        Ok(value)
    }

    /// `endpoint` names the request in logs; the URL itself carries the API key
    async fn fetch_body(&self, url: &Url, endpoint: &str) -> Result<String> {
        self.rate_limiter.wait().await;

        debug!("Fetching: {}", endpoint);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Catalog(format!("HTTP {status} for {endpoint}")));
        }

        Ok(response.text().await?)
    }

    /// `search.php?f=<shard>`: every meal whose name starts with the shard key
    pub async fn search_by_shard(&self, shard: &str) -> Result<Vec<RawMeal>> {
        let envelope: MealsEnvelope = self.get_json("search.php", &[("f", shard)]).await?;
        Ok(envelope.meals.unwrap_or_default())
    }

    /// `lookup.php?i=<id>`: zero or one meal
    pub async fn lookup_by_id(&self, id: i64) -> Result<Option<RawMeal>> {
        let id = id.to_string();
        let envelope: MealsEnvelope = self.get_json("lookup.php", &[("i", &id)]).await?;
        Ok(envelope.meals.unwrap_or_default().into_iter().next())
    }

    /// `list.php?<kind>=list`: category, area or ingredient names
    pub async fn list_basic(&self, kind: ListKind) -> Result<Vec<String>> {
        let envelope: ListEnvelope = self.get_json("list.php", &[(kind.param(), "list")]).await?;

        Ok(envelope
            .meals
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| entry.get(kind.field()).and_then(|v| v.as_str()))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

/// Rate limiter spacing out requests to the catalog
pub struct RateLimiter {
    delay: Duration,
    last_request: tokio::sync::Mutex<Option<tokio::time::Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u64) -> Self {
        let delay = Duration::from_millis(1000 / requests_per_second.max(1));
        Self {
            delay,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait if necessary to respect rate limit
    pub async fn wait(&self) {
        // Reserve the next slot under the lock, sleep outside it
        let wait_time = {
            let mut last = self.last_request.lock().await;
            let now = tokio::time::Instant::now();

            let slot = match *last {
                Some(last_time) if last_time + self.delay > now => last_time + self.delay,
                _ => now,
            };
            *last = Some(slot);
            slot.saturating_duration_since(now)
        };

        if !wait_time.is_zero() {
            debug!("Rate limiting: waiting {:?}", wait_time);
            sleep(wait_time).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::tempdir;

    fn catalog_config(base_url: &str) -> CatalogConfig {
        CatalogConfig {
            base_url: base_url.to_string(),
            api_key: "1".to_string(),
            request_timeout_seconds: 5,
            fetch_concurrency: 4,
            requests_per_second: 1000,
            user_agent: "TestBot/1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(2); // 2 requests per second

        let start = tokio::time::Instant::now();
        limiter.wait().await; // First request - no wait
        limiter.wait().await; // Second request - should wait ~500ms
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(400));
    }

    #[test]
    fn test_request_url_is_stable() {
        let dir = tempdir().unwrap();
        let client = CatalogClient::new(
            &catalog_config("https://www.themealdb.com/api/json/v1/"),
            CacheStore::new(dir.path(), None),
        )
        .unwrap();

        let url = client.request_url("search.php", &[("f", "a")]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.themealdb.com/api/json/v1/1/search.php?f=a"
        );

        let url = client.request_url("categories.php", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.themealdb.com/api/json/v1/1/categories.php"
        );
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/1/search.php")
            .match_query(Matcher::UrlEncoded("f".into(), "b".into()))
            .with_status(200)
            .with_body(r#"{"meals":[{"idMeal":"1","strMeal":"Beef Stew"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let client =
            CatalogClient::new(&catalog_config(&server.url()), CacheStore::new(dir.path(), None))
                .unwrap();

        let first = client.search_by_shard("b").await.unwrap();
        let second = client.search_by_shard("b").await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_not_cached() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/1/search.php")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), None);
        let client = CatalogClient::new(&catalog_config(&server.url()), cache.clone()).unwrap();

        let result = client.search_by_shard("q").await;
        assert!(matches!(result, Err(Error::Catalog(_))));

        let key = client.request_url("search.php", &[("f", "q")]).unwrap();
        assert_eq!(cache.get(key.as_str()).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_catalog_error_omits_api_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/s3cr3t/search.php")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut config = catalog_config(&server.url());
        config.api_key = "s3cr3t".to_string();
        let dir = tempdir().unwrap();
        let client = CatalogClient::new(&config, CacheStore::new(dir.path(), None)).unwrap();

        let err = client.search_by_shard("a").await.unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
        assert!(!err.to_string().contains("s3cr3t"));
        assert!(!err.log_safe().contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/1/search.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let client =
            CatalogClient::new(&catalog_config(&server.url()), CacheStore::new(dir.path(), None))
                .unwrap();

        assert!(client.search_by_shard("x").await.is_err());
    }

    #[tokio::test]
    async fn test_lookup_and_lists() {
        let mut server = Server::new_async().await;
        let _lookup = server
            .mock("GET", "/1/lookup.php")
            .match_query(Matcher::UrlEncoded("i".into(), "52772".into()))
            .with_body(r#"{"meals":[{"idMeal":"52772","strMeal":"Teriyaki Chicken Casserole"}]}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/1/lookup.php")
            .match_query(Matcher::UrlEncoded("i".into(), "1".into()))
            .with_body(r#"{"meals":null}"#)
            .create_async()
            .await;
        let _areas = server
            .mock("GET", "/1/list.php")
            .match_query(Matcher::UrlEncoded("a".into(), "list".into()))
            .with_body(r#"{"meals":[{"strArea":"Italian"},{"strArea":" Japanese "},{"strArea":""}]}"#)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let client =
            CatalogClient::new(&catalog_config(&server.url()), CacheStore::new(dir.path(), None))
                .unwrap();

        let meal = client.lookup_by_id(52772).await.unwrap().unwrap();
        assert_eq!(meal.id(), Some(52772));
        assert!(client.lookup_by_id(1).await.unwrap().is_none());

        let areas = client.list_basic(ListKind::Areas).await.unwrap();
        assert_eq!(areas, vec!["Italian".to_string(), "Japanese".to_string()]);
    }
}
