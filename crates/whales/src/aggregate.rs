//! Top-wallet aggregation over whale transfers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stablewatch_db::models::{TopWalletAggregate, TransferRecord};
use std::collections::BTreeMap;

type GroupKey<'a> = (&'a str, &'a str, &'a str);

fn group_by<'a, F>(whales: &'a [TransferRecord], wallet: F) -> BTreeMap<GroupKey<'a>, Decimal>
where
    F: Fn(&'a TransferRecord) -> &'a str,
{
    let mut totals = BTreeMap::new();
    for record in whales {
        let key = (record.network.as_str(), wallet(record), record.token.as_str());
        *totals.entry(key).or_insert(Decimal::ZERO) += record.amount;
    }
    totals
}

/// Rebuild the full aggregate set from every whale transfer.
///
/// Sender and receiver volumes are grouped independently: each
/// `(network, from_address, token)` group yields a row with only
/// `total_sent` set, and each `(network, to_address, token)` group a row with
/// only `total_received` set. A wallet on both sides therefore gets two rows.
/// Sender rows come first; within each half rows are sorted by network,
/// wallet and token.
pub fn top_wallets(whales: &[TransferRecord], now: DateTime<Utc>) -> Vec<TopWalletAggregate> {
    let row = |(network, wallet, token): GroupKey<'_>, sent, received| TopWalletAggregate {
        network: network.to_string(),
        wallet_address: wallet.to_string(),
        token: token.to_string(),
        total_sent: sent,
        total_received: received,
        last_updated: now,
    };

    let sent = group_by(whales, |record| record.from_address.as_str())
        .into_iter()
        .map(|(key, total)| row(key, total, Decimal::ZERO));
    let received = group_by(whales, |record| record.to_address.as_str())
        .into_iter()
        .map(|(key, total)| row(key, Decimal::ZERO, total));

    sent.chain(received).collect()
}
