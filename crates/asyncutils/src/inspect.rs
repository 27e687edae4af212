use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// An [`AsyncRead`] that calls `inspect` with the size of every chunk that
    /// passes through it. Used to feed progress counters while copying.
    pub struct InspectReader<R, F> {
        #[pin]
        inner: R,
        inspect: F,
    }
}

impl<R, F> InspectReader<R, F>
where
    R: AsyncRead,
    F: FnMut(usize),
{
    pub fn new(inner: R, inspect: F) -> Self {
        Self { inner, inspect }
    }
}

impl<R, F> AsyncRead for InspectReader<R, F>
where
    R: AsyncRead,
    F: FnMut(usize),
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let read = buf.filled().len() - before;
            if read > 0 {
                (this.inspect)(read);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_counts_every_byte() {
        let data = vec![7u8; 10_000];
        let mut seen = 0usize;
        let mut calls = 0usize;
        let mut reader = InspectReader::new(&data[..], |n| {
            seen += n;
            calls += 1;
        });
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        drop(reader);
        assert_eq!(out, data);
        assert_eq!(seen, 10_000);
        assert!(calls >= 1);
    }

    #[tokio::test]
    async fn test_empty_reader_never_inspects() {
        let mut calls = 0usize;
        let mut reader = InspectReader::new(&b""[..], |_| calls += 1);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        drop(reader);
        assert_eq!(calls, 0);
    }
}
