//! Scripted two-party negotiation over the in-process market server.
//!
//! A seller and a buyer each open a session on the same conversation, trade
//! messages and counter-offers, and settle the deal. Every update both
//! sessions observe is printed, so the whole optimistic-send / confirmation /
//! snapshot-replacement flow is visible end to end.
//!
//! ```bash
//! cargo run -p negotiation-cli
//! ```

mod server;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mandi_deal::{DealSnapshot, DealStatus, OfferEntry};
use mandi_negotiation::{
    ConversationSnapshot, NegotiationSession, Participant, Role, SessionConfig, SessionContext,
    SessionUpdate,
};

use crate::server::{LocalSocket, MarketServer};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn seed_conversation() -> ConversationSnapshot {
    ConversationSnapshot {
        id: "conv-wheat-1".into(),
        participants: vec![
            Participant {
                id: "seller-savita".into(),
                name: "Savita".into(),
                phone: "+91-9800000001".into(),
                role: Role::Seller,
            },
            Participant {
                id: "buyer-bhanu".into(),
                name: "Bhanu".into(),
                phone: "+91-9800000002".into(),
                role: Role::Buyer,
            },
        ],
        messages: Vec::new(),
        linked_deal_id: Some("deal-wheat-1".into()),
    }
}

fn seed_deal() -> DealSnapshot {
    let created_at = now_millis();
    DealSnapshot {
        id: "deal-wheat-1".into(),
        crop_name: "wheat".into(),
        quantity_kg: 500,
        original_price: 2200.0,
        current_offer: 2000.0,
        status: DealStatus::Pending,
        last_offer_by: "buyer-bhanu".into(),
        expires_at: created_at + 86_400_000,
        history: vec![OfferEntry {
            price: 2000.0,
            offered_by: "buyer-bhanu".into(),
            timestamp: created_at,
        }],
        created_at,
    }
}

async fn open_session(
    server: &MarketServer,
    user_id: &str,
) -> Result<NegotiationSession<LocalSocket>> {
    let client = server.client_for(user_id);
    let socket = client.socket();
    let session = NegotiationSession::open(
        SessionContext::new(user_id),
        SessionConfig::default(),
        "conv-wheat-1",
        Arc::new(client.clone()),
        Arc::new(client),
        socket,
    )
    .await?;
    Ok(session)
}

fn show(label: &str, update: &SessionUpdate) {
    match update {
        SessionUpdate::MessageReceived(m) => {
            println!("[{label}] message {} from {}: {}", m.id, m.sender_id, m.content)
        }
        SessionUpdate::MessagesRead { reader_id } => {
            println!("[{label}] {reader_id} read the conversation")
        }
        SessionUpdate::Countdown(c) => println!("[{label}] deal clock: {c}"),
        SessionUpdate::DealExpired => println!("[{label}] deal expired"),
        SessionUpdate::ConnectionLost(reason) => println!("[{label}] connection lost: {reason}"),
    }
}

/// Pump the session until the next chat message lands, printing whatever
/// else (clock ticks, read receipts) comes through first.
async fn pump_until_message(label: &str, session: &mut NegotiationSession<LocalSocket>) {
    while let Some(update) = session.next_update().await {
        let is_message = matches!(update, SessionUpdate::MessageReceived(_));
        show(label, &update);
        if is_message {
            break;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "negotiation_cli=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = MarketServer::new(seed_conversation(), seed_deal());
    let mut seller = open_session(&server, "seller-savita").await?;
    let mut buyer = open_session(&server, "buyer-bhanu").await?;

    println!(
        "deal on the table: {} x {}kg at {} (offered by {})",
        seller.deal().map(|d| d.crop_name.as_str()).unwrap_or("?"),
        seller.deal().map(|d| d.quantity_kg).unwrap_or_default(),
        seller.deal().map(|d| d.current_offer).unwrap_or_default(),
        seller.deal().map(|d| d.last_offer_by.as_str()).unwrap_or("?"),
    );

    // Seller opens with a message; both sides see it round-trip.
    seller.send_text("2000 is too low for this grade of wheat").await?;
    pump_until_message("seller", &mut seller).await; // own confirmation
    pump_until_message("buyer", &mut buyer).await; // inbound message

    // Seller counters. The returned snapshot replaces the cached deal.
    let countered = seller.counter_offer(2150.0).await?;
    println!(
        "[seller] countered at {} (history {} entries)",
        countered.current_offer,
        countered.history.len()
    );

    // Buyer answers in chat, then pulls the fresh snapshot and takes the
    // seller's price.
    buyer.send_text("Deal. 2150 works for me").await?;
    pump_until_message("buyer", &mut buyer).await;
    pump_until_message("seller", &mut seller).await;

    buyer.reload_deal().await?;
    let settled = buyer.accept().await?;
    println!(
        "[buyer] accepted at {} - status {:?}",
        settled.current_offer, settled.status
    );

    if let Some(perms) = buyer.permissions() {
        println!(
            "[buyer] can download settlement invoice: {}",
            perms.can_download_settlement
        );
    }

    seller.close().await;
    buyer.close().await;
    Ok(())
}
