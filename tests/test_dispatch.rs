//! Black-box tests for the message dispatch core over the loopback
//! transport.
//!
//! Run with:
//!   cargo test --test test_dispatch

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use subreact_xapp::bus::{
    ACTIVE_XAPP_PING, BusTransport, LoopbackTransport, MessageType, RIC_CONTROL_REQ, RIC_INDICATION,
};
use subreact_xapp::dispatch::{
    DispatchLoop, DispatchTable, MessageContext, MessageHandler, PING_ACK, RegistryError,
    register_builtin_handlers,
};
use subreact_xapp::error::AppError;
use subreact_xapp::runtime::{Component, spawn_components};

/// Counts invocations and echoes the payload back under `reply_type`.
struct Echo {
    reply_type: MessageType,
    calls: AtomicUsize,
}

impl MessageHandler for Echo {
    fn handle(&self, ctx: &mut MessageContext<'_>) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = ctx.payload().to_vec();
        ctx.reply(self.reply_type, &payload)?;
        ctx.release();
        Ok(())
    }
}

#[test]
fn every_type_reaches_exactly_its_handler() {
    let transport = Arc::new(LoopbackTransport::new());
    let echo = Arc::new(Echo { reply_type: 900, calls: AtomicUsize::new(0) });
    let defaults = Arc::new(Mutex::new(Vec::new()));

    let mut builder = {
        let defaults = defaults.clone();
        DispatchTable::builder().default_handler(
            move |ctx: &mut MessageContext<'_>| -> Result<(), AppError> {
                defaults.lock().unwrap().push(ctx.mtype());
                ctx.release();
                Ok(())
            },
        )
    };
    register_builtin_handlers(&mut builder).unwrap();
    {
        let echo = echo.clone();
        builder
            .register(700, move |ctx: &mut MessageContext<'_>| echo.handle(ctx))
            .unwrap();
    }
    let dispatch = DispatchLoop::new(transport.clone(), builder.build(), Duration::ZERO);

    let types = [RIC_INDICATION, 700, 1, ACTIVE_XAPP_PING, 700, 2];
    for t in types {
        transport.inject(t, format!("payload-{t}").into_bytes());
    }
    assert_eq!(dispatch.run_once().unwrap(), types.len());

    assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*defaults.lock().unwrap(), vec![1, 2]);

    let sent: Vec<_> = transport.sent().into_iter().map(|m| (m.mtype, m.payload)).collect();
    assert_eq!(
        sent,
        vec![
            (RIC_CONTROL_REQ, format!("payload-{RIC_INDICATION}").into_bytes()),
            (900, b"payload-700".to_vec()),
            (ACTIVE_XAPP_PING, PING_ACK.to_vec()),
            (900, b"payload-700".to_vec()),
        ]
    );
    assert_eq!(transport.released(), types.len() as u64);
    assert_eq!(transport.outstanding(), 0);
    assert_eq!(transport.invalid_releases(), 0);
}

#[test]
fn forgetful_handler_is_covered_by_the_loop() {
    let transport = Arc::new(LoopbackTransport::new());
    let mut builder = DispatchTable::builder();
    builder
        .register(5, |_ctx: &mut MessageContext<'_>| -> Result<(), AppError> { Ok(()) })
        .unwrap();
    let dispatch = DispatchLoop::new(transport.clone(), builder.build(), Duration::ZERO);

    for _ in 0..10 {
        transport.inject(5, Vec::new());
    }
    dispatch.run_once().unwrap();

    assert_eq!(transport.released(), 10);
    assert_eq!(dispatch.stats().snapshot().forced_releases, 10);
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut builder = DispatchTable::builder();
    builder
        .register(10, |ctx: &mut MessageContext<'_>| -> Result<(), AppError> {
            ctx.release();
            Ok(())
        })
        .unwrap();
    let err = builder
        .register(10, |ctx: &mut MessageContext<'_>| -> Result<(), AppError> {
            ctx.release();
            Ok(())
        })
        .err()
        .unwrap();
    assert_eq!(err, RegistryError::DuplicateRegistration { mtype: 10 });
    assert_eq!(builder.build().registered_types(), vec![10]);
}

#[tokio::test]
async fn dispatch_component_drains_until_shutdown() {
    let transport = Arc::new(LoopbackTransport::new());
    let mut builder = DispatchTable::builder();
    register_builtin_handlers(&mut builder).unwrap();
    let dispatch = DispatchLoop::new(transport.clone(), builder.build(), Duration::from_millis(5));
    let stats = dispatch.stats();

    let shutdown = CancellationToken::new();
    let components: Vec<Box<dyn Component>> = vec![Box::new(dispatch)];
    let handle = spawn_components(components, shutdown.clone());

    for _ in 0..3 {
        transport.inject(RIC_INDICATION, b"ind".to_vec());
    }
    for _ in 0..100 {
        if stats.snapshot().dispatched == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    handle.join().await.unwrap();

    assert_eq!(stats.snapshot().dispatched, 3);
    assert_eq!(transport.sent().len(), 3);
    assert_eq!(transport.outstanding(), 0);
    assert!(transport.is_healthy());
}
