//! PostgREST-backed sink (e.g. a Supabase project's REST endpoint).

use crate::models::{IngestCursor, TopWalletAggregate, TransferRecord, WalletBalanceSnapshot};
use crate::sink::{Sink, SinkError, SinkResult, Table};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=minimal";
const RETURN_MINIMAL: &str = "return=minimal";

/// Rows requested per page when reading whale transfers.
const PAGE_SIZE: usize = 1000;

/// Whale transfer columns; `amount` is read as text so no digits are lost.
const WHALE_COLUMNS: &str = "network,chain_id,token,token_address,from_address,to_address,\
                             amount::text,tx_hash,log_index,block_number,block_timestamp,\
                             gas_used,gas_price,gas_fee,status";

/// Sink talking to a PostgREST API with a service key.
pub struct RestSink {
    client: Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct CursorRow {
    last_block: u64,
}

impl RestSink {
    /// Create a REST sink.
    ///
    /// # Arguments
    /// * `url` - Project URL; `/rest/v1` is appended
    /// * `service_key` - Key sent as `apikey` and bearer token
    pub fn new(url: &str, service_key: &str) -> SinkResult<Self> {
        if url.trim().is_empty() {
            return Err(SinkError::Config("REST sink requires a URL".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            service_key: service_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, table.name()))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check(table: Table, response: Response) -> SinkResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            table: table.name(),
            status: status.as_u16(),
            body,
        })
    }

    async fn post_rows<T: Serialize + Sync>(&self, table: Table, rows: &[T]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut request = self.request(Method::POST, table);
        request = match table.conflict_key() {
            Some(key) => request
                .query(&[("on_conflict", key)])
                .header("Prefer", MERGE_DUPLICATES),
            None => request.header("Prefer", RETURN_MINIMAL),
        };

        let response = request.json(rows).send().await?;
        Self::check(table, response).await?;
        debug!("Posted {} rows to {}", rows.len(), table.name());
        Ok(())
    }
}

#[async_trait]
impl Sink for RestSink {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn upsert_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        self.post_rows(Table::Transfers, rows).await
    }

    async fn upsert_whale_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        self.post_rows(Table::WhaleTransfers, rows).await
    }

    async fn insert_balances(&self, rows: &[WalletBalanceSnapshot]) -> SinkResult<()> {
        self.post_rows(Table::WalletBalances, rows).await
    }

    async fn whale_transfers(&self) -> SinkResult<Vec<TransferRecord>> {
        let mut rows: Vec<TransferRecord> = Vec::new();

        // The server may cap a page below PAGE_SIZE, so only an empty page
        // ends the scan.
        loop {
            let offset = rows.len().to_string();
            let limit = PAGE_SIZE.to_string();
            let response = self
                .request(Method::GET, Table::WhaleTransfers)
                .query(&[
                    ("select", WHALE_COLUMNS),
                    ("order", "tx_hash.asc,log_index.asc"),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ])
                .send()
                .await?;
            let page: Vec<TransferRecord> =
                Self::check(Table::WhaleTransfers, response).await?.json().await?;
            if page.is_empty() {
                break;
            }
            rows.extend(page);
        }

        debug!("Read {} whale transfers", rows.len());
        Ok(rows)
    }

    async fn replace_top_wallets(&self, rows: &[TopWalletAggregate]) -> SinkResult<()> {
        // PostgREST refuses unfiltered deletes.
        let response = self
            .request(Method::DELETE, Table::TopWallets)
            .query(&[("wallet_address", "not.is.null")])
            .header("Prefer", RETURN_MINIMAL)
            .send()
            .await?;
        Self::check(Table::TopWallets, response).await?;

        self.post_rows(Table::TopWallets, rows).await
    }

    async fn cursor(&self, network: &str) -> SinkResult<Option<u64>> {
        let filter = format!("eq.{}", network);
        let response = self
            .request(Method::GET, Table::Cursors)
            .query(&[("select", "last_block"), ("network", filter.as_str())])
            .send()
            .await?;
        let rows: Vec<CursorRow> = Self::check(Table::Cursors, response).await?.json().await?;
        Ok(rows.first().map(|row| row.last_block))
    }

    async fn save_cursor(&self, network: &str, last_block: u64) -> SinkResult<()> {
        let body = IngestCursor {
            network: network.to_string(),
            last_block,
            updated_at: Utc::now(),
        };
        self.post_rows(Table::Cursors, &[body]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferStatus;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transfer(log_index: u64, amount: &str) -> TransferRecord {
        TransferRecord {
            network: "Ethereum".to_string(),
            chain_id: 1,
            token: "DAI".to_string(),
            token_address: "0x6B175474E89094C44Da98b954EedeAC495271d0F".to_string(),
            from_address: "0x1111111111111111111111111111111111111111".to_string(),
            to_address: "0x2222222222222222222222222222222222222222".to_string(),
            amount: amount.parse().unwrap(),
            tx_hash: format!("0x{:064x}", log_index / 4),
            log_index,
            block_number: 19_000_000,
            block_timestamp: DateTime::from_timestamp(1_709_000_000, 0).unwrap(),
            gas_used: 65_000,
            gas_price: 30_000_000_000,
            gas_fee: 1_950_000_000_000_000,
            status: TransferStatus::Success,
        }
    }

    fn page(range: std::ops::Range<u64>) -> Vec<TransferRecord> {
        range.map(|i| transfer(i, "1000000.5")).collect()
    }

    fn aggregate() -> TopWalletAggregate {
        TopWalletAggregate {
            network: "Ethereum".to_string(),
            wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
            token: "USDT".to_string(),
            total_sent: Decimal::ZERO,
            total_received: Decimal::from(3_000_000),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_replace_deletes_then_inserts() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/whale_top_wallets"))
            .and(query_param("wallet_address", "not.is.null"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/whale_top_wallets"))
            .and(header("Prefer", RETURN_MINIMAL))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        sink.replace_top_wallets(&[aggregate()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_upsert_targets_network_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/ingest_cursors"))
            .and(query_param("on_conflict", "network"))
            .and(header("Prefer", MERGE_DUPLICATES))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/ingest_cursors"))
            .and(query_param("network", "eq.Polygon"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "last_block": 5150 }])),
            )
            .mount(&server)
            .await;

        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        sink.save_cursor("Polygon", 5150).await.unwrap();
        assert_eq!(sink.cursor("Polygon").await.unwrap(), Some(5150));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        let err = sink.save_cursor("BSC", 1).await.unwrap_err();
        match err {
            SinkError::Status { table, status, body } => {
                assert_eq!(table, "ingest_cursors");
                assert_eq!(status, 409);
                assert_eq!(body, "conflict");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_upserts_merge_on_natural_key() {
        let server = MockServer::start().await;
        for table in ["stablecoin_transfers", "whale_transfers"] {
            Mock::given(method("POST"))
                .and(path(format!("/rest/v1/{table}")))
                .and(query_param("on_conflict", "tx_hash,log_index"))
                .and(header("Prefer", MERGE_DUPLICATES))
                .and(header("apikey", "service-key"))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;
        }

        let rows = vec![transfer(0, "999999.999999999999999999")];
        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        sink.upsert_transfers(&rows).await.unwrap();
        sink.upsert_whale_transfers(&rows).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            assert_eq!(body[0]["amount"], "999999.999999999999999999");
            assert_eq!(body[0]["log_index"], 0);
            assert_eq!(body[0]["status"], "success");
        }
    }

    #[tokio::test]
    async fn test_balances_post_exact_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/wallet_balances"))
            .and(header("Prefer", RETURN_MINIMAL))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = WalletBalanceSnapshot {
            wallet_address: "0x3333333333333333333333333333333333333333".to_string(),
            network: "BSC".to_string(),
            token: "USDT".to_string(),
            token_address: "0x55d398326f99059fF775485246999027B3197955".to_string(),
            balance: "123456.000000000000000001".parse().unwrap(),
            fetched_at: Utc::now(),
        };
        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        sink.insert_balances(&[snapshot]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body[0]["balance"], "123456.000000000000000001");
    }

    #[tokio::test]
    async fn test_whale_transfers_read_every_page() {
        let server = MockServer::start().await;
        let pages = [(0, page(0..1000)), (1000, page(1000..1500)), (1500, Vec::new())];
        for (offset, rows) in pages {
            Mock::given(method("GET"))
                .and(path("/rest/v1/whale_transfers"))
                .and(query_param("offset", offset.to_string()))
                .and(query_param("limit", "1000"))
                .and(query_param("order", "tx_hash.asc,log_index.asc"))
                .respond_with(ResponseTemplate::new(200).set_body_json(rows))
                .expect(1)
                .mount(&server)
                .await;
        }

        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        let rows = sink.whale_transfers().await.unwrap();

        assert_eq!(rows.len(), 1500);
        assert_eq!(rows[1499].log_index, 1499);
        assert_eq!(rows[0].amount, Decimal::new(10_000_005, 1));
    }

    #[tokio::test]
    async fn test_whale_transfers_follow_a_lower_server_cap() {
        let server = MockServer::start().await;
        let pages = [(0, page(0..500)), (500, page(500..700)), (700, Vec::new())];
        for (offset, rows) in pages {
            Mock::given(method("GET"))
                .and(path("/rest/v1/whale_transfers"))
                .and(query_param("offset", offset.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(rows))
                .expect(1)
                .mount(&server)
                .await;
        }

        let sink = RestSink::new(&server.uri(), "service-key").unwrap();
        assert_eq!(sink.whale_transfers().await.unwrap().len(), 700);
    }

    #[test]
    fn test_requires_url() {
        assert!(matches!(RestSink::new("  ", "key"), Err(SinkError::Config(_))));
    }
}
