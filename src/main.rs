// =============================================================================
// Aurora Spot Nexus — Main Entry Point
// =============================================================================
//
// The engine starts in Demo + Paused mode for safety. Users must explicitly
// switch to Live mode via the dashboard or API, and live order submission
// additionally requires `ENABLE_LIVE_TRADING=true` in the environment.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod audit;
mod binance;
mod config;
mod decision_envelope;
mod errors;
mod execution;
mod futures_intel;
mod gateway;
mod indicators;
mod market_data;
mod position_engine;
mod reconcile;
mod regime;
mod risk;
mod runtime_config;
mod safety;
mod screener;
mod signals;
mod supervisor;
mod types;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::audit::AuditEventKind;
use crate::binance::client::BinanceClient;
use crate::config::Config;
use crate::execution::OrderIntent;
use crate::gateway::Gateway;
use crate::market_data::CandleKey;
use crate::risk::TradeProposal;
use crate::risk::sizing;
use crate::runtime_config::RuntimeConfig;
use crate::screener::{Screener, ScreenerConfig, ScreenerInputs};
use crate::signals::SignalSide;
use crate::types::{AccountMode, Side};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Aurora Spot Nexus — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    let app_config = Config::from_env()?;

    // SAFETY: Force Demo + Paused on startup unless the operator has
    // explicitly opted into live trading via both MODE=live and
    // ENABLE_LIVE_TRADING=true.
    if app_config.enable_live_trading && app_config.mode == types::TradingMode::Live {
        config.trading_mode = types::TradingMode::Live;
        config.account_mode = AccountMode::Live;
        warn!("Live trading explicitly enabled via environment");
    } else {
        config.trading_mode = types::TradingMode::Paused;
        config.account_mode = AccountMode::Demo;
    }

    if !app_config.symbols.is_empty() {
        config.symbols = app_config.symbols.clone();
    }
    if config.symbols.is_empty() {
        config.symbols = vec![
            "BTCUSDT".into(),
            "ETHUSDT".into(),
            "BNBUSDT".into(),
            "XRPUSDT".into(),
            "SOLUSDT".into(),
        ];
    }

    info!(symbols = ?config.symbols, "Configured trading pairs");
    info!(
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        "Engine starting in SAFE mode unless explicitly overridden"
    );

    // ── 2. Build Binance client + Gateway ─────────────────────────────────
    let binance_client = Arc::new(BinanceClient::new(
        app_config.venue_api_key.clone(),
        app_config.venue_api_secret.clone(),
    ));
    let gateway = Arc::new(Gateway::new(binance_client.clone()));

    // ── 3. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, app_config, gateway));

    // ── 4. Spawn market data streams ─────────────────────────────────────
    let symbols = state.runtime_config.read().symbols.clone();

    for symbol in &symbols {
        let ms = state.market_store.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) =
                    market_data::candle_buffer::run_kline_stream(&sym, "1m", &ms).await
                {
                    error!(symbol = %sym, error = %e, "Kline 1m stream error — reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });

        let ms = state.market_store.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) =
                    market_data::candle_buffer::run_kline_stream(&sym, "5m", &ms).await
                {
                    error!(symbol = %sym, error = %e, "Kline 5m stream error — reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });

        let ms = state.market_store.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) =
                    market_data::candle_buffer::run_kline_stream(&sym, "1h", &ms).await
                {
                    error!(symbol = %sym, error = %e, "Kline 1h stream error — reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });

        {
            let procs = state.trade_processors.read();
            if let Some(tp) = procs.get(symbol) {
                let processor = tp.clone();
                let sym = symbol.clone();
                tokio::spawn(async move {
                    loop {
                        if let Err(e) =
                            market_data::trade_stream::run_trade_stream(&sym, &processor).await
                        {
                            error!(symbol = %sym, error = %e, "Trade stream error — reconnecting in 5s");
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                });
            }
        }

        let ob = state.orderbook_manager.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = market_data::orderbook::run_depth_stream(&sym, &ob).await {
                    error!(symbol = %sym, error = %e, "Depth stream error — reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    info!(count = symbols.len(), "Market data streams launched");

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    let api_handle = tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });
    state.supervisor.register("api_server", api_handle);

    // ── 6. Screener + trading pipeline (every 5 seconds) ─────────────────
    let screener = Arc::new(Screener::new(
        ScreenerConfig {
            cycle_interval: Duration::from_secs(5),
            ..ScreenerConfig::default()
        },
        symbols.clone(),
    ));

    let pipeline_state = state.clone();
    let pipeline_screener = screener.clone();
    let pipeline_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        info!("screening + execution pipeline starting");

        let inputs = ScreenerInputs {
            market_store: pipeline_state.market_store.clone(),
            regime_detector: pipeline_state.regime_detector.clone(),
        };

        let state_for_refresh = pipeline_state.clone();
        let state_for_candidates = pipeline_state.clone();

        pipeline_screener
            .run(
                &inputs,
                move || state_for_refresh.runtime_config.read().symbols.clone(),
                move |candidates| {
                    pipeline_state.supervisor.heartbeat("screener");
                    for candidate in candidates {
                        let st = state_for_candidates.clone();
                        let candidate = candidate.clone();
                        tokio::spawn(async move {
                            handle_candidate(&st, candidate).await;
                        });
                    }
                },
            )
            .await;
    });
    state.supervisor.register("screener", pipeline_handle);

    // ── 7. Exit monitor loop (stop/take-profit/reversal/emergency) ───────
    let exit_state = state.clone();
    let exit_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let syms = exit_state.runtime_config.read().symbols.clone();
            for symbol in &syms {
                let key = CandleKey { symbol: symbol.clone(), interval: "1m".to_string() };
                let candles = exit_state.market_store.tail(&key, 1);
                let Some(last) = candles.last() else { continue };
                let Some(high) = Decimal::try_from(last.high).ok() else { continue };
                let Some(low) = Decimal::try_from(last.low).ok() else { continue };
                let Some(close) = Decimal::try_from(last.close).ok() else { continue };

                exit_state.position_manager.update_price(symbol, close);

                let exits = exit_state.position_manager.check_exits(symbol, high, low);
                for exit in exits {
                    if let Some((realized, feature_key)) = exit_state
                        .position_manager
                        .close_position(&exit.position_id, exit.reason, exit.exit_price)
                    {
                        exit_state.audit.record(AuditEventKind::PositionClosed {
                            position_id: exit.position_id.clone(),
                            instrument: symbol.clone(),
                            reason: exit.reason.to_string(),
                            realized_pnl: realized,
                        });
                        exit_state.safety.record_outcome(&feature_key, realized > Decimal::ZERO);
                        exit_state.increment_version();
                    }
                }
            }
            exit_state.supervisor.heartbeat("exit_monitor");
        }
    });
    state.supervisor.register("exit_monitor", exit_handle);

    // ── 8. Reconciliation loop ───────────────────────────────────────────
    let recon_state = state.clone();
    let recon_client = binance_client.clone();
    let recon_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;

            if recon_state.runtime_config.read().account_mode == AccountMode::Demo {
                recon_state.supervisor.heartbeat("reconcile");
                continue;
            }

            match reconcile::reconcile_once(&recon_client, &recon_state.position_manager, &recon_state.balances).await
            {
                Ok(_) => {
                    *recon_state.last_reconcile_ok.write() = Some(std::time::Instant::now());
                    *recon_state.last_reconcile_error.write() = None;
                    recon_state.increment_version();
                }
                Err(e) => {
                    *recon_state.last_reconcile_error.write() = Some(format!("{e}"));
                    warn!(error = %e, "reconciliation failed");
                }
            }
            recon_state.supervisor.heartbeat("reconcile");
        }
    });
    state.supervisor.register("reconcile", recon_handle);

    // ── 9. Regime detection loop ────────────────────────────────────────
    let regime_state = state.clone();
    let regime_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let syms = regime_state.runtime_config.read().symbols.clone();
            if let Some(symbol) = syms.first() {
                let key = CandleKey { symbol: symbol.clone(), interval: "5m".to_string() };
                let candles = regime_state.market_store.tail(&key, 100);
                let closes = regime_state.market_store.closes(&key, 100);
                if candles.len() >= 50 {
                    regime_state.regime_detector.read().update(&candles);
                    let _ = closes;
                    regime_state.increment_version();
                }
            }
            regime_state.supervisor.heartbeat("regime_detector");
        }
    });
    state.supervisor.register("regime_detector", regime_handle);

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 10. Graceful shutdown ────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    screener.request_stop();

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    state.supervisor.shutdown(Duration::from_secs(10)).await;

    info!("Aurora Spot Nexus shut down complete.");
    Ok(())
}

/// Run a screened candidate through the risk gate stack and, if authorized,
/// hand it to the executor. Kept as a free function (rather than inlined in
/// the pipeline closure) since it has its own early-return structure that
/// would otherwise deeply nest the spawn closure above.
async fn handle_candidate(state: &Arc<AppState>, candidate: crate::signals::CompositeSignal) {
    if candidate.side == SignalSide::None {
        return;
    }
    let side = match candidate.side {
        SignalSide::Long => Side::Long,
        SignalSide::Short => Side::Short,
        SignalSide::None => return,
    };

    let symbol = candidate.instrument.clone();
    let Some(entry_price_f64) = state.market_store.trade_processor(&symbol).map(|tp| tp.last_price()) else {
        return;
    };
    let Some(entry_price) = Decimal::try_from(entry_price_f64).ok() else { return };
    if entry_price <= Decimal::ZERO {
        return;
    }

    let app_config = &state.app_config;
    let leverage = app_config.leverage_default;

    let Some(stop_loss) = sizing::stop_loss_price(entry_price, app_config.stop_loss_roi, leverage, side) else {
        return;
    };
    let Some(take_profit) = sizing::take_profit_price(entry_price, app_config.take_profit_roi, leverage, side) else {
        return;
    };
    let Some(liquidation) = sizing::liquidation_price(entry_price, leverage, side) else {
        return;
    };
    let Some(quantity) = sizing::position_size(
        app_config.initial_balance,
        Decimal::new(2, 0),
        leverage,
        entry_price,
    ) else {
        return;
    };
    let margin = entry_price * quantity / Decimal::from(leverage.max(1));
    let break_even_roi = sizing::break_even_roi(
        app_config.break_even_activation,
        app_config.break_even_buffer,
        Decimal::new(4, 2),
    );

    let existing = state.position_manager.get_open_positions();
    let proposal = TradeProposal {
        open_position_count: existing.len() as u32,
        notional_usd: entry_price * quantity,
        leverage,
        existing_exposure_usd: state.position_manager.total_exposure(),
        entry_price,
        stop_loss_price: stop_loss,
        take_profit_price: take_profit,
        liquidation_price: liquidation,
        side,
        break_even_roi_pct: break_even_roi,
    };

    let decision = state.risk_agent.evaluate(&proposal);
    if !decision.is_allowed() {
        if let crate::risk::RiskDecision::Blocked { gate, reason } = &decision {
            state.audit.record(AuditEventKind::GateBlocked {
                instrument: symbol.clone(),
                gate: gate.to_string(),
                reason: reason.clone(),
            });
        }
        return;
    }

    state.audit.record(AuditEventKind::SignalEmitted {
        instrument: symbol.clone(),
        score: candidate.score,
        side: format!("{side}"),
    });

    let intent = OrderIntent {
        symbol: symbol.clone(),
        side,
        quantity,
        leverage,
        margin,
        stop_loss,
        take_profit,
        reference_price: entry_price,
        max_slippage_pct: Decimal::new(5, 1),
        signal_fingerprint: format!("{}-{}", candidate.timestamp_ms, candidate.score.round() as i64),
        feature_key: candidate.feature_key.clone(),
    };

    let result = state.executor.execute(intent).await;
    info!(symbol = %symbol, side = %side, result = %result, "execution result");
}
