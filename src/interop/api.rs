use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, FLOAT, INT};

use super::{DataStore, Host, HostValue, ScriptHandle};
use crate::assets::ImageHandle;

/// Names every instance sees in its global namespace. Library modules may refer to them too.
pub const BUILTIN_GLOBALS: [&str; 3] = ["Host", "Data", "Script"];

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

fn number(value: &Dynamic) -> RhaiResult<f64> {
    if let Ok(float) = value.as_float() {
        return Ok(float as f64);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f64);
    }
    Err(format!("expected a number, found '{}'", value.type_name()).into())
}

pub fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<Host>("Host");
    engine.register_fn("Frame", |host: Host| host.frame() as INT);
    engine.register_fn("Add", |host: Host, name: &str| host.request_add(name));
    engine.register_fn("Screen", |host: Host| host.screen());
    engine.register_fn("ScreenWidth", |host: Host| host.screen_width() as INT);
    engine.register_fn("ScreenHeight", |host: Host| host.screen_height() as INT);
    engine.register_fn("LoadImage", |host: Host, path: &str| -> RhaiResult<ImageHandle> {
        host.load_image(path).map_err(|err| format!("{err:#}").into())
    });
    engine.register_fn("Log", |_host: Host, message: &str| {
        tracing::info!(target: "script", "{message}");
    });
    engine.register_fn("Rand", |host: Host, min: Dynamic, max: Dynamic| -> RhaiResult<FLOAT> {
        let sample = host.random_range(number(&min)?, number(&max)?).map_err(|err| err.to_string())?;
        Ok(sample as FLOAT)
    });

    engine.register_type_with_name::<DataStore>("Data");
    engine.register_fn("Get", |data: DataStore, key: &str| {
        data.get(key).map(HostValue::into_dynamic).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("Set", |data: DataStore, key: &str, value: Dynamic| -> RhaiResult<()> {
        data.set_dynamic(key, value).map_err(|err| err.to_string().into())
    });
    engine.register_fn("SetAll", |data: DataStore, entries: Map| -> RhaiResult<()> {
        data.set_all_dynamic(entries).map_err(|err| err.to_string().into())
    });
    engine.register_fn("Keys", |data: DataStore| data.keys().into_iter().map(Dynamic::from).collect::<Array>());

    engine.register_type_with_name::<ScriptHandle>("Script");
    engine.register_fn("Remove", |handle: ScriptHandle| handle.remove());
    engine.register_fn("Name", |handle: ScriptHandle| handle.name().to_string());

    engine.register_type_with_name::<ImageHandle>("Image");
    engine.register_fn("Width", |image: ImageHandle| image.width() as INT);
    engine.register_fn("Height", |image: ImageHandle| image.height() as INT);
    engine.register_fn("Draw", |dest: ImageHandle, source: ImageHandle, x: Dynamic, y: Dynamic| -> RhaiResult<()> {
        dest.draw(&source, number(&x)?, number(&y)?);
        Ok(())
    });
}
