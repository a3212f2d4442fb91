use tokio::io::{AsyncRead, AsyncReadExt};

use super::demuxer::{DemuxSink, TsDemuxer};
use crate::diagnostics::Diagnostics;
use crate::error::Result;

const READ_CHUNK: usize = 64 * 1024;

/// Feeds a whole byte source through `demuxer` and flushes it.
///
/// Returns the number of bytes read.
pub async fn demux_reader<R, S>(
    reader: &mut R,
    demuxer: &mut TsDemuxer,
    sink: &mut S,
    diag: &mut Diagnostics,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    S: DemuxSink,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        demuxer.feed(&buf[..n], sink, diag);
    }
    demuxer.flush(sink, diag);
    log::debug!("demuxed {} bytes", total);
    Ok(total)
}
