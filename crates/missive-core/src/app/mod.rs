//! App - application layer.
//!
//! ports を組み合わせてキュー処理のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **BatchProcessor**: due な item を claim→send→write back する 1 パス
//! - **AuditRecorder**: batch ごとの監査レコード追記と trim
//! - **WorkerLoop**: interval ごとに BatchProcessor を起動（重複実行なし）
//! - **ScheduleService**: producer 側の schedule / cancel / list
//! - **QueueCounts**: status ごとの件数

pub mod audit;
pub mod batch;
pub mod schedule;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::audit::AuditRecorder;
pub use self::batch::{
    BatchOptions, BatchProcessor, BatchProcessorConfig, BatchReport, ItemOutcome, ItemResult,
};
pub use self::schedule::{OwnerQueue, ScheduleService};
pub use self::status::QueueCounts;
pub use self::worker_loop::{WorkerConfig, WorkerHandle, start_worker};
