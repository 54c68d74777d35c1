/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};

use crate::detection::Frame as RgbFrame;

/// FFmpeg解码过滤器: 视频文件 → RGB24帧
///
/// 上游滤镜链已转换为 rgb24, 这里只按行拷贝去掉 stride 填充。
pub struct DecodeFilter {
    tx: Sender<RgbFrame>,
    pub count: usize,
    pub last: Instant,
    pub current_fps: f64,
    pub dropped_frames: usize, // 丢弃的帧数
    pub total_frames: usize,   // 总帧数
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbFrame>) -> Self {
        Self {
            tx,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        let rgb = unsafe {
            self.total_frames += 1;

            // 空帧没有可交付的画面
            if frame.as_ptr().is_null() || frame.is_empty() {
                self.dropped_frames += 1;
                tracing::warn!("⚠️ 丢弃帧 #{}: 空帧", self.total_frames);
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as usize;
            let h = (*frame.as_ptr()).height as usize;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0];

            if w == 0 || h == 0 || data.is_null() || stride < 0 || (stride as usize) < w * 3 {
                return Err(format!(
                    "帧 #{} 数据异常: {}x{} stride={}",
                    self.total_frames, w, h, stride
                ));
            }

            let row_bytes = w * 3;
            let mut buffer = Vec::with_capacity(row_bytes * h);
            for y in 0..h {
                let row = std::slice::from_raw_parts(data.add(y * stride as usize), row_bytes);
                buffer.extend_from_slice(row);
            }
            RgbFrame::new(0, w as u32, h as u32, buffer)
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            self.current_fps = self.count as f64 / elapsed;
            tracing::debug!(
                "📺 解码统计: 实际{:.1}fps | 总帧{} | 丢弃{}",
                self.current_fps,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 接收端关闭说明消费方已放弃本次运行, 以错误结束解码
        self.tx
            .send(rgb)
            .map_err(|_| "帧接收端已关闭".to_string())?;

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::debug!(
            "✅ 解码线程退出 (总帧{}, 丢弃{})",
            self.total_frames,
            self.dropped_frames
        );
    }
}
