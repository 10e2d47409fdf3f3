// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use quotestream_market::{
    MarketClient, MarketSubscription, Profile, QuoteSynchronizer, client::QuoteObserver,
};
use quotestream_network::ConnectionState;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{
    config::resolve_config,
    opt::{ProfileOpt, StreamOpt},
};

fn state_channel(client: &MarketClient) -> mpsc::UnboundedReceiver<ConnectionState> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.register_state_observer(Arc::new(move |state: &ConnectionState| {
        let _ = tx.send(*state);
    }));
    rx
}

fn print_quote(label: &'static str) -> QuoteObserver {
    Arc::new(move |synchronizer: &QuoteSynchronizer| match synchronizer {
        QuoteSynchronizer::Update(update) => {
            println!(
                "{label} {}: {}",
                update.symbol(),
                Value::Object(update.fields().clone())
            );
        }
        QuoteSynchronizer::Copy(quote) => {
            println!("{label} {} (cached): {quote:?}", quote.symbol);
        }
    })
}

fn print_profile(profile: &Profile) {
    match serde_json::to_string_pretty(profile) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Failed to format profile for {}: {e}", profile.symbol),
    }
}

pub async fn run_stream_command(opt: StreamOpt) -> anyhow::Result<()> {
    let config = resolve_config(&opt.server)?;
    tracing::info!("Streaming from {}", config.server_url());

    let client = MarketClient::new(config)?;
    let mut states = state_channel(&client);

    let mut subscriptions: Vec<MarketSubscription> = Vec::new();
    for symbol in &opt.quotes {
        subscriptions.push(client.subscribe_to_quotes(symbol, print_quote("quote"))?);
    }
    for symbol in &opt.prices {
        subscriptions.push(client.subscribe_to_price_changes(symbol, print_quote("price"))?);
    }
    if opt.timestamp {
        subscriptions.push(client.subscribe_to_timestamp(Arc::new(|timestamp: &String| {
            println!("timestamp {timestamp}");
        }))?);
    }

    client.connect()?;

    let mut profile = opt.profile;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for interrupt")?;
                tracing::info!("Interrupted, shutting down");
                break;
            }
            Some(state) = states.recv() => {
                tracing::info!("Connection {state}");
                if state == ConnectionState::Connected
                    && let Some(symbol) = profile.take()
                {
                    client.request_profile(&symbol, |profile| print_profile(&profile))?;
                }
            }
        }
    }

    for subscription in &subscriptions {
        subscription.dispose();
    }
    client.dispose();
    Ok(())
}

pub async fn run_profile_command(opt: ProfileOpt) -> anyhow::Result<()> {
    let config = resolve_config(&opt.server)?;
    let client = MarketClient::new(config)?;
    let mut states = state_channel(&client);
    client.connect()?;

    let request = async {
        while let Some(state) = states.recv().await {
            if state == ConnectionState::Connected {
                break;
            }
        }

        let (tx, rx) = oneshot::channel();
        client.request_profile(&opt.symbol, move |profile| {
            let _ = tx.send(profile);
        })?;
        Ok::<Profile, anyhow::Error>(rx.await.context("Profile request abandoned")?)
    };

    let result = tokio::time::timeout(Duration::from_secs(opt.timeout_secs), request).await;
    client.dispose();

    let profile = result
        .with_context(|| format!("Timed out waiting for the profile of {}", opt.symbol))??;
    print_profile(&profile);
    Ok(())
}
