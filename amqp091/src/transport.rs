//! Socket setup and low level frame transport.
//!
//! The transport owns the framed halves of the socket and exposes them as a
//! `Stream` of decoded frames and a `Sink` of outgoing frames. Only the
//! connection engine ever touches it, which is what makes multi-frame
//! writes atomic with respect to other writers.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use amqp091_types::definitions::PROTOCOL_HEADER;
use amqp091_types::{Frame, FrameCodec};
use futures_util::{Sink, Stream};
use pin_project_lite::pin_project;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::OpenError;

/// TCP keepalive knobs, `idle:interval:count` in the URL options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Seconds of idleness before the first probe.
    pub idle: u64,
    /// Seconds between probes.
    pub interval: u64,
    /// Probes lost before the connection is declared dead.
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: 60,
            interval: 10,
            count: 3,
        }
    }
}

/// Anything the transport can run over: plain TCP or a TLS wrap of it.
pub trait TransportIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> TransportIo for T {}

/// The boxed IO the connection layer uses once the scheme is known.
pub type IoStream = Box<dyn TransportIo>;

pin_project! {
    /// Frame transport over an established (and possibly TLS-wrapped) socket.
    #[derive(Debug)]
    pub struct Transport<Io> {
        #[pin]
        framed_write: FramedWrite<WriteHalf<Io>, FrameCodec>,

        #[pin]
        framed_read: FramedRead<ReadHalf<Io>, FrameCodec>,
    }
}

impl<Io> Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends the protocol preamble and binds the frame codec.
    ///
    /// Until tune negotiation completes both codecs enforce the
    /// protocol-minimum frame size.
    pub async fn bind(mut io: Io) -> Result<Self, OpenError> {
        io.write_all(&PROTOCOL_HEADER).await?;

        let (reader, writer) = tokio::io::split(io);
        let framed_write = FramedWrite::new(writer, FrameCodec::new());
        let framed_read = FramedRead::new(reader, FrameCodec::new());
        Ok(Self {
            framed_write,
            framed_read,
        })
    }

    /// Raises the frame size accepted and produced after tune negotiation.
    pub fn set_max_frame_size(&mut self, frame_max: usize) {
        self.framed_read
            .decoder_mut()
            .set_max_frame_size(frame_max);
        self.framed_write
            .encoder_mut()
            .set_max_frame_size(frame_max);
    }
}

impl<Io> Stream for Transport<Io>
where
    Io: AsyncRead + Unpin,
{
    type Item = Result<Frame, amqp091_types::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().framed_read.poll_next(cx)
    }
}

impl<Io> Sink<Frame> for Transport<Io>
where
    Io: AsyncWrite + Unpin,
{
    type Error = amqp091_types::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().framed_write.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.project().framed_write.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().framed_write.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().framed_write.poll_close(cx)
    }
}

/// Opens the TCP socket with the configured connect timeout and keepalive.
pub(crate) async fn connect_tcp(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    keepalive: &KeepaliveConfig,
) -> Result<TcpStream, OpenError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| OpenError::Timeout)??;
    stream.set_nodelay(true)?;

    let params = TcpKeepalive::new().with_time(Duration::from_secs(keepalive.idle));
    #[cfg(unix)]
    let params = params
        .with_interval(Duration::from_secs(keepalive.interval))
        .with_retries(keepalive.count);
    SockRef::from(&stream).set_tcp_keepalive(&params)?;

    Ok(stream)
}

#[cfg(feature = "rustls")]
pub(crate) mod tls {
    //! TLS negotiation with `tokio-rustls`.

    use std::sync::Arc;

    use librustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use librustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
    use librustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use librustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
    use tokio::net::TcpStream;
    use tokio_rustls::TlsConnector;

    use crate::error::OpenError;

    /// Wraps the socket in TLS, with SNI set to `domain`. Certificate and
    /// hostname verification are on unless `verify_peer` is false.
    pub(crate) async fn wrap(
        stream: TcpStream,
        domain: &str,
        verify_peer: bool,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, OpenError> {
        let config = if verify_peer {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
                .with_no_client_auth()
        };

        let domain = ServerName::try_from(domain.to_owned())
            .map_err(|_| OpenError::InvalidDomain)?;
        let connector = TlsConnector::from(Arc::new(config));
        connector
            .connect(domain, stream)
            .await
            .map_err(|err| OpenError::Tls(err.to_string()))
    }

    /// Accepts any certificate; only used when `verify_peer=false` was
    /// explicitly requested.
    #[derive(Debug)]
    struct NoCertificateVerification(CryptoProvider);

    impl NoCertificateVerification {
        fn new() -> Self {
            Self(librustls::crypto::ring::default_provider())
        }
    }

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, librustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, librustls::Error> {
            verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, librustls::Error> {
            verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}

#[cfg(all(feature = "native-tls", not(feature = "rustls")))]
pub(crate) mod tls {
    //! TLS negotiation with `tokio-native-tls`.

    use tokio::net::TcpStream;

    use crate::error::OpenError;

    pub(crate) async fn wrap(
        stream: TcpStream,
        domain: &str,
        verify_peer: bool,
    ) -> Result<tokio_native_tls::TlsStream<TcpStream>, OpenError> {
        let connector = libnative_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!verify_peer)
            .danger_accept_invalid_hostnames(!verify_peer)
            .build()
            .map_err(|err| OpenError::Tls(err.to_string()))?;
        tokio_native_tls::TlsConnector::from(connector)
            .connect(domain, stream)
            .await
            .map_err(|err| OpenError::Tls(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amqp091_types::Method;
    use futures_util::{SinkExt, StreamExt};

    #[tokio::test]
    async fn bind_sends_the_preamble() {
        let mock = tokio_test::io::Builder::new()
            .write(b"AMQP\x00\x00\x09\x01")
            .build();
        Transport::bind(mock).await.unwrap();
    }

    #[tokio::test]
    async fn sends_and_receives_frames() {
        let heartbeat = [8u8, 0, 0, 0, 0, 0, 0, 0xCE];
        let mock = tokio_test::io::Builder::new()
            .write(b"AMQP\x00\x00\x09\x01")
            .write(&heartbeat)
            .read(&[1, 0, 0, 0, 0, 0, 4, 0, 90, 0, 11, 0xCE])
            .build();

        let mut transport = Transport::bind(mock).await.unwrap();
        transport.send(Frame::heartbeat()).await.unwrap();

        let frame = transport.next().await.unwrap().unwrap();
        assert_eq!(frame, Frame::method(0, Method::TxSelectOk));
    }
}
