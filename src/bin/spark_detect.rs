/// 视频火花检测 (Spark Detection)
///
/// 流程:
/// 1. 加载 YOLOv8-OBB 模型 (失败即退出)
/// 2. 逐帧解码 → 检测 → 计数 → 绘制 → 编码
/// 3. 输出标注视频与火花总数
use clap::Parser;
use spark_obb::pipeline::BarProgress;
use spark_obb::{logging, models, Args, PipelineError, RunSummary, SparkPipeline};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let thresholds = args.thresholds()?;
    let model_config = args.model_config()?;
    let run_config = args.run_config()?;

    let model = models::load_shared(&model_config).map_err(|e| {
        tracing::error!("❌ 模型加载失败: {}", e);
        e
    })?;

    let pipeline = SparkPipeline::new(model, run_config).map_err(|e| {
        tracing::error!("❌ {}", e);
        e
    })?;
    let mut bar = if args.json {
        BarProgress::hidden()
    } else {
        BarProgress::new()
    };

    match pipeline.run(&args.source, &thresholds, &mut bar) {
        Ok(summary) => {
            report(&summary, args.json)?;
            Ok(())
        }
        Err(PipelineError::Incomplete { summary, cause }) => {
            report(&summary, args.json)?;
            Err(anyhow::anyhow!(
                "视频中途解码失败, 只输出了前 {} 帧: {}",
                summary.frames_processed,
                cause
            ))
        }
        Err(e) => {
            tracing::error!("❌ {}", e);
            Err(e.into())
        }
    }
}

fn report(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    if summary.completed {
        println!("✅ 检测完成. 火花总数: {}", summary.spark_count);
    } else {
        println!("⚠️ 检测未完成. 已统计火花: {}", summary.spark_count);
    }
    println!(
        "📊 帧数: {} | 平均 {:.1} fps | 用时 {:.1}s",
        summary.frames_processed,
        summary.fps(),
        summary.elapsed_secs
    );
    for (name, n) in &summary.class_totals {
        println!("   - {}: {}", name, n);
    }
    println!("💾 输出视频: {}", summary.output_path.display());
    Ok(())
}
