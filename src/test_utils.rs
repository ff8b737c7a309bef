//! Test Utilities Module
//!
//! Test doubles for the two external collaborators of the relay: a wallet
//! that answers from a script and a result sink that records reports.

#![cfg(test)]

use crate::{
    BatchRequest, BatchStatus, CallsStatus, Receipt, SendCallsResponse,
    error::{SinkError, WalletError},
    sink::{BatchReport, ResultSink},
    wallet::WalletProvider,
};
use async_trait::async_trait;
use ethers::providers::ProviderError;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Wallet that records requests and answers status queries from a script
///
/// Once the script runs out every status query answers `PENDING`.
#[derive(Default)]
pub struct ScriptedWallet {
    submit_response: Mutex<Option<Result<SendCallsResponse, String>>>,
    statuses: Mutex<VecDeque<Result<CallsStatus, String>>>,
    submitted: Mutex<Vec<BatchRequest>>,
    status_queries: Mutex<Vec<String>>,
}

impl ScriptedWallet {
    /// Wallet that accepts every batch with the given response
    pub fn responding(response: SendCallsResponse) -> Arc<Self> {
        let wallet = Self::default();
        *wallet.submit_response.lock().unwrap() = Some(Ok(response));
        Arc::new(wallet)
    }

    pub fn accepting(calls_id: &str) -> Arc<Self> {
        Self::responding(SendCallsResponse::Id(calls_id.to_string()))
    }

    /// Accept the following batches under `calls_id`
    pub fn accept_as(&self, calls_id: &str) {
        *self.submit_response.lock().unwrap() = Some(Ok(SendCallsResponse::Id(calls_id.to_string())));
    }

    /// Wallet that rejects every batch
    pub fn rejecting(message: &str) -> Arc<Self> {
        let wallet = Self::default();
        *wallet.submit_response.lock().unwrap() = Some(Err(message.to_string()));
        Arc::new(wallet)
    }

    /// Queue answers to the next status queries; `Err` fails the query
    pub fn script(&self, statuses: Vec<Result<CallsStatus, String>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub fn submissions(&self) -> Vec<BatchRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.status_queries.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn send_calls(&self, request: &BatchRequest) -> Result<SendCallsResponse, WalletError> {
        self.submitted.lock().unwrap().push(request.clone());
        match self.submit_response.lock().unwrap().clone() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(wallet_error(&message)),
            None => Err(wallet_error("no submit response scripted")),
        }
    }

    async fn get_calls_status(&self, calls_id: &str) -> Result<CallsStatus, WalletError> {
        self.status_queries.lock().unwrap().push(calls_id.to_string());
        match self.statuses.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(wallet_error(&message)),
            None => Ok(pending()),
        }
    }
}

/// Sink that keeps every report in memory
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<BatchReport>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<BatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn report(&self, report: BatchReport) -> Result<(), SinkError> {
        self.reports.lock().unwrap().push(report);
        Ok(())
    }
}

pub fn wallet_error(message: &str) -> WalletError {
    WalletError::Provider(ProviderError::CustomError(message.to_string()))
}

pub fn pending() -> CallsStatus {
    CallsStatus { status: BatchStatus::Pending, receipts: vec![] }
}

pub fn confirmed(transaction_hash: &str, logs: Vec<Value>) -> CallsStatus {
    CallsStatus {
        status: BatchStatus::Confirmed,
        receipts: vec![Receipt { transaction_hash: transaction_hash.to_string(), logs }],
    }
}

/// ERC-20 `Approval` log with a 1 USDC amount
pub fn sample_log() -> Value {
    json!({
        "address": "0x036cbd53842c5426634e7929541ec2318f3dcf7e",
        "topics": ["0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"],
        "data": "0x00000000000000000000000000000000000000000000000000000000000f4240",
    })
}
