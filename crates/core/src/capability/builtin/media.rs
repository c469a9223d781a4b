use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::ok;
use crate::capability::{CallError, StaticModule, i64_arg, str_arg};
use crate::types::Args;

pub fn module() -> StaticModule {
    let volume = Arc::new(AtomicI64::new(10));
    StaticModule::new("media_module")
        .with_function("play_media", play_media)
        .with_function("adjust_volume", move |args| {
            let volume = Arc::clone(&volume);
            async move { adjust_volume(&volume, &args) }
        })
}

async fn play_media(args: Args) -> Result<Value, CallError> {
    let media_type = str_arg(&args, "media_type")?;
    let source = str_arg(&args, "source")?;
    let content_id = str_arg(&args, "content_id")?;
    Ok(ok(json!({
        "playing": true,
        "media_type": media_type,
        "source": source,
        "content_id": content_id,
    })))
}

/// Volume is clamped to 0..=30.
fn adjust_volume(volume: &AtomicI64, args: &Args) -> Result<Value, CallError> {
    let level = i64_arg(args, "level")?.clamp(0, 30);
    let previous = volume.swap(level, Ordering::SeqCst);
    Ok(ok(json!({ "level": level, "previous": previous })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::resolve_callable;

    #[tokio::test]
    async fn volume_is_clamped() {
        let m = module();
        let adjust = resolve_callable(&m, "adjust_volume").unwrap();
        let mut a = Args::new();
        a.insert("level".into(), json!(99));
        let out = adjust.call(a).await.unwrap();
        assert_eq!(out["level"], 30);
        assert_eq!(out["previous"], 10);
    }

    #[tokio::test]
    async fn float_level_is_mismatch() {
        let m = module();
        let adjust = resolve_callable(&m, "adjust_volume").unwrap();
        let mut a = Args::new();
        a.insert("level".into(), json!(2.5));
        assert!(matches!(adjust.call(a).await, Err(CallError::Mismatch(_))));
    }
}
