use crossbeam_channel::Receiver;

/// FFmpeg `AVERROR_EOF`, 即 `-MKTAG('E', 'O', 'F', ' ')`
pub const AVERROR_EOF: i32 = -0x2046_4F45;

/// 自定义输入的读回调数据源
///
/// 按需从通道取下一帧, 一帧可以分多次读完; 发送端全部关闭后返回 EOF。
pub struct RawFrameReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl RawFrameReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> i32 {
        while self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(next) => {
                    self.current = next;
                    self.pos = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }

        let n = (self.current.len() - self.pos)
            .min(buf.len())
            .min(i32::MAX as usize);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        n as i32
    }
}
