//! missive-core
//!
//! Core building blocks for processing a durable queue of scheduled
//! messages.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, payload, item, audit, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, QueueStore, DispatchExecutor）
//! - **queue**: retry policy
//! - **app**: アプリケーションロジック（batch, audit, worker_loop, schedule）
//! - **impls**: 実装（InMemoryQueueStore, LogDispatch など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

#[cfg(test)]
mod testing;
