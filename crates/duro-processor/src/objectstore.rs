//! Single-shot object-store PUT upload (spec §4.H step 4).

use crate::error::ProcessorError;

pub struct ObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl ObjectStore {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("duro-processor/0.2.0")
            .build()
            .expect("failed to build object store HTTP client");
        Self { client, base_url }
    }

    /// Object key layout: `<table>-<YYYY-MM-DD-HH-MM>.csv`.
    pub fn object_key(table_name: &str, now: chrono::DateTime<chrono::Utc>) -> String {
        format!(
            "{}-{}.csv",
            table_name.replace('.', "_"),
            now.format("%Y-%m-%d-%H-%M")
        )
    }

    /// Upload `body` under `key`, returning the object's full URL.
    pub async fn put(&self, key: &str, body: Vec<u8>) -> Result<String, ProcessorError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = self
            .client
            .put(&url)
            .body(body)
            .send()
            .await
            .map_err(|err| ProcessorError::Upload(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProcessorError::Upload(format!(
                "object store returned {}",
                response.status()
            )));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_follows_table_timestamp_layout() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-07-28T14:05:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            ObjectStore::object_key("reporting.orders", now),
            "reporting_orders-2026-07-28-14-05.csv"
        );
    }
}
