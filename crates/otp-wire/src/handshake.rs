//! `hello`/`hello_ack` HMAC-SHA256 handshake.
//!
//! HMAC-SHA256 over a shared secret rather than a public-key signature:
//! confidentiality is explicitly out of scope here — there is no key
//! exchange, only integrity/authenticity of the handshake.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{read_frame, write_frame};
use crate::error::{Result, WireError};
use crate::message::{Frame, Message, PROTOCOL_VERSION};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

fn compute_mac(secret: &[u8], nonce: &[u8], node_id: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(nonce);
    mac.update(node_id.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn random_nonce() -> Vec<u8> {
    let mut nonce = vec![0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn verify_mac(secret: &[u8], nonce: &[u8], node_id: &str, mac: &[u8]) -> bool {
    let expected = compute_mac(secret, nonce, node_id);
    expected.ct_eq(mac).into()
}

/// Outcome of a successful handshake: the peer's canonical node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub node_id: String,
}

/// Runs the initiator side of the handshake: send `hello`, validate
/// `hello_ack`. `local_node_id` is this node's own canonical id.
pub async fn initiate<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    local_node_id: &str,
    shared_secret: &[u8],
) -> Result<PeerIdentity> {
    let nonce = random_nonce();
    let mac = compute_mac(shared_secret, &nonce, local_node_id);
    write_frame(
        stream,
        &Frame::new(Message::Hello {
            node_id: local_node_id.to_string(),
            nonce,
            mac,
        }),
    )
    .await?;

    let reply = read_frame(stream).await?;
    if reply.v != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch {
            local: PROTOCOL_VERSION,
            peer: reply.v,
        });
    }
    match reply.message {
        Message::HelloAck { node_id, nonce, mac } => {
            if verify_mac(shared_secret, &nonce, &node_id, &mac) {
                Ok(PeerIdentity { node_id })
            } else {
                Err(WireError::AuthFailed)
            }
        }
        _ => Err(WireError::Malformed(
            "expected hello_ack as the first reply to hello".to_string(),
        )),
    }
}

/// Runs the receiver side of the handshake: validate the inbound `hello`,
/// reply with `hello_ack`.
pub async fn accept<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    local_node_id: &str,
    shared_secret: &[u8],
) -> Result<PeerIdentity> {
    let first = read_frame(stream).await?;
    if first.v != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch {
            local: PROTOCOL_VERSION,
            peer: first.v,
        });
    }
    let (peer_node_id, peer_nonce, peer_mac) = match first.message {
        Message::Hello { node_id, nonce, mac } => (node_id, nonce, mac),
        _ => {
            return Err(WireError::Malformed(
                "expected hello as the first frame on a new connection".to_string(),
            ))
        }
    };

    if !verify_mac(shared_secret, &peer_nonce, &peer_node_id, &peer_mac) {
        return Err(WireError::AuthFailed);
    }

    let nonce = random_nonce();
    let mac = compute_mac(shared_secret, &nonce, local_node_id);
    write_frame(
        stream,
        &Frame::new(Message::HelloAck {
            node_id: local_node_id.to_string(),
            nonce,
            mac,
        }),
    )
    .await?;

    Ok(PeerIdentity {
        node_id: peer_node_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn matching_secrets_complete_the_handshake_both_ways() {
        let (mut initiator, mut acceptor) = duplex(4096);
        let secret = b"shared-secret".to_vec();

        let (init_result, accept_result) = tokio::join!(
            initiate(&mut initiator, "a@localhost:1", &secret),
            accept(&mut acceptor, "b@localhost:2", &secret),
        );

        assert_eq!(init_result.unwrap().node_id, "b@localhost:2");
        assert_eq!(accept_result.unwrap().node_id, "a@localhost:1");
    }

    #[tokio::test]
    async fn mismatched_secrets_fail_authentication() {
        let (mut initiator, acceptor) = duplex(4096);

        // Drop the acceptor half once it errors out, so the initiator's
        // blocked read observes a clean close instead of hanging forever.
        let accept_task = tokio::spawn(async move {
            let mut acceptor = acceptor;
            accept(&mut acceptor, "b@localhost:2", b"secret-b").await
        });

        let init_result = initiate(&mut initiator, "a@localhost:1", b"secret-a").await;
        let accept_result = accept_task.await.unwrap();

        assert!(accept_result.is_err());
        assert!(init_result.is_err());
    }

    #[tokio::test]
    async fn a_different_protocol_version_is_rejected_before_mac_validation() {
        let (mut initiator, mut acceptor) = duplex(4096);
        let secret = b"shared-secret".to_vec();

        let bad_frame = Frame {
            v: PROTOCOL_VERSION + 1,
            corr_id: None,
            message: Message::Hello {
                node_id: "a@localhost:1".to_string(),
                nonce: random_nonce(),
                mac: compute_mac(&secret, &random_nonce(), "a@localhost:1"),
            },
        };
        write_frame(&mut initiator, &bad_frame).await.unwrap();

        let err = accept(&mut acceptor, "b@localhost:2", &secret).await.unwrap_err();
        assert!(matches!(err, WireError::VersionMismatch { .. }));
    }
}
