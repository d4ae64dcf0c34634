use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

use crate::transport::{QueryType, ResolveOutcome};

/// The DNS query primitive the analyzer probes through.
///
/// Implementations never return errors: every failure, including a
/// timeout, is reported inside the outcome.
#[async_trait]
pub trait Resolve: Send + Sync {
	async fn resolve(
		&self,
		domain: &str,
		query_type: QueryType,
		server: SocketAddr,
		timeout: Duration,
	) -> ResolveOutcome;
}

/// DNS response information extracted from a parsed message
#[derive(Debug)]
pub struct DnsResponse {
	pub rcode: ResponseCode,
	/// Answer rdata, one record per line, in the style of `dig +short`
	pub answer: String,
}

fn record_type(query_type: QueryType) -> RecordType {
	match query_type {
		QueryType::A => RecordType::A,
		QueryType::AAAA => RecordType::AAAA,
		QueryType::CNAME => RecordType::CNAME,
		QueryType::MX => RecordType::MX,
		QueryType::NS => RecordType::NS,
		QueryType::TXT => RecordType::TXT,
	}
}

/// Build a recursive DNS query message for the given domain and query type.
///
/// Returns the serialized query bytes ready to send over UDP.
pub fn build_query(domain: &str, query_type: QueryType, txid: u16) -> Result<Vec<u8>> {
	let name = Name::from_ascii(domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", domain, e))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, record_type(query_type)));

	let bytes = message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))?;
	Ok(bytes)
}

/// Parse a DNS response, validating the transaction ID and rendering the answers.
///
/// Returns an error if the response cannot be parsed or the txid does not match.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<DnsResponse> {
	let message = Message::from_vec(bytes)
		.map_err(|e| anyhow!("failed to parse DNS response: {}", e))?;

	if message.id() != expected_txid {
		return Err(anyhow!(
			"txid mismatch: expected {}, got {}",
			expected_txid, message.id()
		));
	}

	if message.message_type() != MessageType::Response {
		return Err(anyhow!("received a query instead of a response"));
	}

	let answer = message.answers().iter()
		.map(|r| r.data().to_string())
		.collect::<Vec<_>>()
		.join("\n");

	Ok(DnsResponse {
		rcode: message.response_code(),
		answer,
	})
}

/// Plain UDP resolver client.
///
/// Each call binds a dedicated socket so a late reply to an earlier
/// probe can never be read as the answer to the current one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpResolver;

#[async_trait]
impl Resolve for UdpResolver {
	async fn resolve(
		&self,
		domain: &str,
		query_type: QueryType,
		server: SocketAddr,
		timeout: Duration,
	) -> ResolveOutcome {
		let start = Instant::now();
		let txid: u16 = rand::random();

		let query_bytes = match build_query(domain, query_type, txid) {
			Ok(bytes) => bytes,
			Err(e) => return ResolveOutcome::failed(start.elapsed(), e.to_string()),
		};

		let bind_addr = if server.is_ipv4() {
			"0.0.0.0:0"
		} else {
			"[::]:0"
		};
		let socket = match UdpSocket::bind(bind_addr).await {
			Ok(s) => s,
			Err(e) => {
				return ResolveOutcome::failed(
					start.elapsed(),
					format!("failed to bind socket: {}", e),
				);
			}
		};

		if let Err(e) = socket.send_to(&query_bytes, server).await {
			return ResolveOutcome::failed(
				start.elapsed(),
				format!("failed to send query to {}: {}", server, e),
			);
		}

		// Retry recv on txid mismatch; stray datagrams are not the answer
		let mut buf = vec![0u8; 4096];
		let max_retries = 3;
		let mut last_error = None;
		for _ in 0..max_retries {
			let elapsed = start.elapsed();
			if elapsed >= timeout {
				return ResolveOutcome::timeout(elapsed);
			}
			let remaining = timeout - elapsed;

			match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
				Ok(Ok((len, _src))) => match parse_response(&buf[..len], txid) {
					Ok(response) => {
						let elapsed = start.elapsed();
						if response.rcode != ResponseCode::NoError {
							debug!(domain, rcode = %response.rcode, "resolver returned non-success rcode");
						}
						let answer = if response.answer.is_empty() {
							None
						} else {
							Some(response.answer)
						};
						return ResolveOutcome::answered(elapsed, answer);
					}
					Err(e) => {
						debug!(domain, error = %e, "discarding unexpected datagram");
						last_error = Some(e.to_string());
						continue;
					}
				},
				Ok(Err(e)) => {
					return ResolveOutcome::failed(
						start.elapsed(),
						format!("failed to receive from {}: {}", server, e),
					);
				}
				Err(_) => return ResolveOutcome::timeout(start.elapsed()),
			}
		}

		let message = last_error.unwrap_or_else(|| "no valid response".to_string());
		ResolveOutcome::failed(start.elapsed(), message)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hickory_proto::rr::rdata::A;
	use hickory_proto::rr::{RData, Record};

	#[test]
	fn test_build_a_query() {
		let bytes = build_query("example.com", QueryType::A, 1234).unwrap();
		// DNS header is 12 bytes minimum
		assert!(bytes.len() >= 12);
		assert_eq!(bytes[0], (1234 >> 8) as u8);
		assert_eq!(bytes[1], (1234 & 0xff) as u8);
	}

	#[test]
	fn test_build_query_sets_record_type() {
		let bytes = build_query("example.com", QueryType::MX, 7).unwrap();
		let message = Message::from_vec(&bytes).unwrap();
		assert_eq!(message.queries()[0].query_type(), RecordType::MX);
		assert!(message.recursion_desired());
	}

	#[test]
	fn test_parse_response_renders_answers() {
		let query_bytes = build_query("example.com", QueryType::A, 9999).unwrap();
		let mut response = Message::from_vec(&query_bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let name = Name::from_ascii("example.com.").unwrap();
		response.add_answer(Record::from_rdata(name.clone(), 300, RData::A(A::new(93, 184, 216, 34))));
		response.add_answer(Record::from_rdata(name, 300, RData::A(A::new(93, 184, 216, 35))));
		let response_bytes = response.to_vec().unwrap();

		let parsed = parse_response(&response_bytes, 9999).unwrap();
		assert_eq!(parsed.rcode, ResponseCode::NoError);
		assert_eq!(parsed.answer, "93.184.216.34\n93.184.216.35");
	}

	#[test]
	fn test_parse_response_without_answers() {
		let query_bytes = build_query("example.com", QueryType::A, 42).unwrap();
		let mut response = Message::from_vec(&query_bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let response_bytes = response.to_vec().unwrap();

		let parsed = parse_response(&response_bytes, 42).unwrap();
		assert!(parsed.answer.is_empty());
	}

	#[test]
	fn test_txid_mismatch() {
		let query_bytes = build_query("example.com", QueryType::A, 1111).unwrap();
		let mut response = Message::from_vec(&query_bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let response_bytes = response.to_vec().unwrap();

		let result = parse_response(&response_bytes, 2222);
		assert!(result.unwrap_err().to_string().contains("txid mismatch"));
	}

	#[test]
	fn test_query_echo_is_rejected() {
		let query_bytes = build_query("example.com", QueryType::A, 5).unwrap();
		assert!(parse_response(&query_bytes, 5).is_err());
	}

	#[test]
	fn test_truncated_buffer() {
		let bytes = vec![0u8; 5];
		assert!(parse_response(&bytes, 0).is_err());
	}

	#[tokio::test]
	async fn test_udp_resolver_reports_timeout() {
		// A bound socket that never answers
		let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server = silent.local_addr().unwrap();

		let outcome = UdpResolver
			.resolve("example.com", QueryType::A, server, Duration::from_millis(50))
			.await;
		assert!(outcome.timed_out);
		assert_eq!(outcome.error.as_deref(), Some("Timeout"));
		assert!(outcome.answer.is_none());
	}

	#[tokio::test]
	async fn test_udp_resolver_invalid_domain_is_error() {
		let server: SocketAddr = "127.0.0.1:53".parse().unwrap();
		// Labels are limited to 63 octets
		let domain = format!("{}.com", "a".repeat(64));
		let outcome = UdpResolver
			.resolve(&domain, QueryType::A, server, Duration::from_millis(50))
			.await;
		assert!(!outcome.timed_out);
		assert!(outcome.error.is_some());
	}
}
