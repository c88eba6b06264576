use crate::archive::config::IndexConfig;
use crate::archive::record::ItemId;
use crate::archive::snapshot::{IndexHit, IndexStore, UpdateAck};
use crate::error::MigrateError;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;

const PIT_KEEP_ALIVE: &str = "2m";

/// Elasticsearch REST client for the media index.
pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
    user: String,
    password: Option<String>,
    page_size: u64,
}

fn parse_hits(context: &str, body: &Value) -> Result<Vec<(IndexHit, Option<Value>)>, MigrateError> {
    let hits = body
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| MigrateError::index_response(context, "missing hits.hits"))?;

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(id) = hit.get("_id").and_then(Value::as_str) else {
            return Err(MigrateError::index_response(context, "hit without _id"));
        };
        let source = hit.get("_source").cloned().unwrap_or(Value::Null);
        out.push((
            IndexHit {
                id: id.to_string(),
                source,
            },
            hit.get("sort").cloned(),
        ));
    }
    Ok(out)
}

fn parse_update_ack(status: u16, body: &Value) -> Result<UpdateAck, MigrateError> {
    let shards = body
        .get("_shards")
        .ok_or_else(|| MigrateError::index_response("update", "missing _shards"))?;
    let count = |key: &str| shards.get(key).and_then(Value::as_u64).unwrap_or(0);
    Ok(UpdateAck {
        status,
        shards_total: count("total"),
        shards_successful: count("successful"),
    })
}

impl ElasticIndex {
    pub fn new(cfg: &IndexConfig) -> Result<Self, MigrateError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|err| MigrateError::index_transport("client setup", err))?;
        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            index: cfg.name.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            page_size: cfg.page_size,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        match &self.password {
            Some(password) => builder.basic_auth(&self.user, Some(password)),
            None => builder,
        }
    }

    fn send(&self, context: &str, builder: RequestBuilder) -> Result<(u16, Value), MigrateError> {
        let response = builder
            .send()
            .map_err(|err| MigrateError::index_transport(context, err))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(MigrateError::IndexStatus {
                context: context.to_string(),
                status,
            });
        }
        let body: Value = response
            .json()
            .map_err(|err| MigrateError::index_response(context, err.to_string()))?;
        Ok((status, body))
    }

    /// Cluster banner from `GET /`, used by `status`.
    pub fn ping(&self) -> Result<Value, MigrateError> {
        let (_, body) = self.send("ping", self.request(Method::GET, "/"))?;
        Ok(body)
    }

    fn open_pit(&self) -> Result<String, MigrateError> {
        let path = format!("{}/_pit?keep_alive={PIT_KEEP_ALIVE}", self.index);
        let (_, body) = self.send("open point-in-time", self.request(Method::POST, &path))?;
        body.get("id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| MigrateError::index_response("open point-in-time", "missing id"))
    }

    fn close_pit(&self, pit_id: &str) {
        let builder = self
            .request(Method::DELETE, "_pit")
            .json(&json!({ "id": pit_id }));
        if let Err(err) = self.send("close point-in-time", builder) {
            tracing::debug!("closing point-in-time failed: {err}");
        }
    }

    fn page_through(&self, pit_id: &mut String) -> Result<Vec<IndexHit>, MigrateError> {
        let mut out = Vec::new();
        let mut search_after: Option<Value> = None;
        loop {
            let mut body = json!({
                "size": self.page_size,
                "query": { "match_all": {} },
                "pit": { "id": pit_id.as_str(), "keep_alive": PIT_KEEP_ALIVE },
                "sort": [{ "_doc": "asc" }],
            });
            if let Some(after) = &search_after {
                body["search_after"] = after.clone();
            }
            let (_, page) = self.send(
                "paginate",
                self.request(Method::POST, "_search").json(&body),
            )?;
            if let Some(next) = page.get("pit_id").and_then(Value::as_str) {
                *pit_id = next.to_string();
            }

            let hits = parse_hits("paginate", &page)?;
            let fetched = hits.len();
            for (hit, sort) in hits {
                search_after = sort;
                out.push(hit);
            }
            tracing::debug!("fetched {fetched} document(s), {} so far", out.len());
            if fetched == 0 || (fetched as u64) < self.page_size || search_after.is_none() {
                break;
            }
        }
        Ok(out)
    }
}

impl IndexStore for ElasticIndex {
    fn search_by_id(&self, item_id: &ItemId) -> Result<Vec<IndexHit>, MigrateError> {
        let body = json!({ "query": { "match": { "_id": item_id.as_str() } } });
        let path = format!("{}/_search", self.index);
        let (_, page) = self.send("search", self.request(Method::POST, &path).json(&body))?;
        Ok(parse_hits("search", &page)?
            .into_iter()
            .map(|(hit, _)| hit)
            .collect())
    }

    fn paginate_all(&self) -> Result<Vec<IndexHit>, MigrateError> {
        let mut pit_id = self.open_pit()?;
        let result = self.page_through(&mut pit_id);
        self.close_pit(&pit_id);
        result
    }

    fn update(&self, item_id: &ItemId, patch: &Value) -> Result<UpdateAck, MigrateError> {
        let path = format!("{}/_update/{}", self.index, item_id);
        let (status, body) = self.send("update", self.request(Method::POST, &path).json(patch))?;
        parse_update_ack(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_carry_sort_cursor() {
        let body = json!({
            "hits": { "hits": [
                { "_id": "abcdefghijk", "_source": { "media_url": "a.mp4" }, "sort": [7] },
                { "_id": "bbbbbbbbbbb", "_source": {}, "sort": [9] }
            ]}
        });
        let hits = parse_hits("test", &body).expect("hits");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "abcdefghijk");
        assert_eq!(hits[0].0.source["media_url"], "a.mp4");
        assert_eq!(hits[1].1, Some(json!([9])));
    }

    #[test]
    fn missing_hits_is_a_response_error() {
        let err = parse_hits("test", &json!({"took": 1})).expect_err("malformed");
        assert!(matches!(err, MigrateError::IndexResponse { .. }));
    }

    #[test]
    fn update_ack_reads_shard_counts() {
        let ack = parse_update_ack(
            200,
            &json!({"result": "updated", "_shards": {"total": 2, "successful": 1, "failed": 0}}),
        )
        .expect("ack");
        assert_eq!(ack.shards_total, 2);
        assert_eq!(ack.shards_successful, 1);
        assert!(!ack.fully_propagated());
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let cfg = IndexConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..IndexConfig::default()
        };
        let index = ElasticIndex::new(&cfg).expect("client");
        assert!(matches!(
            index.ping(),
            Err(MigrateError::IndexTransport { .. })
        ));
    }
}
