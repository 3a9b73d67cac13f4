/// 推理流水线 (Inference Pipeline)
///
/// 两线程架构:
/// - Prefetcher: 帧读取 + 预处理 (后台线程, 有界队列)
/// - Inference:  模型 → 跟踪 → 过滤 → 观察者 (调用线程)
///
/// 其余组件:
/// - det_file: DeepSORT 检测结果文件
/// - observer: 逐帧观察者 / 评估指标钩子
/// - timer:    平均耗时统计
pub mod det_file;
pub mod inference;
pub mod observer;
pub mod timer;

pub use det_file::{load_det_results, DetRecord, DetResults};
pub use inference::{eval_seq, eval_seq_jde, eval_seq_sde, passes_geometry, SeqContext, SeqOutput};
pub use observer::{FrameContext, FrameObserver, MetricHook};
pub use timer::Timer;
