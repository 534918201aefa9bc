//! Browser listing and device loading.

use async_trait::async_trait;
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use super::require_id;
use crate::models::{ListResourcesRequest, LoadDeviceRequest};

pub struct ListResources;

#[async_trait]
impl Tool for ListResources {
    type Params = ListResourcesRequest;
    const NAME: &'static str = "list_resources";
    const DESCRIPTION: &'static str = "List Ableton Live browser resources of the given type as a tree keyed by name. \
        Folders map to their contents; loadable items carry the id to pass to load_device";

    async fn call(&self, ctx: &AppContext, params: ListResourcesRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.browser().resources(params.kind).await?)
    }
}

pub struct LoadDevice;

#[async_trait]
impl Tool for LoadDevice {
    type Params = LoadDeviceRequest;
    const NAME: &'static str = "load_device";
    const DESCRIPTION: &'static str = "Load a loadable browser item (audio effect, instrument, plugin, drums, midi effect, sound) into a track. \
        Without track_id it goes to the selected track; with no selection instruments go to the last MIDI track \
        and audio effects to the last track. Returns the loaded device";

    fn validate(params: &LoadDeviceRequest) -> KernelResult<()> {
        require_id("device_id", &params.device_id)?;
        if let Some(track_id) = &params.track_id {
            require_id("track_id", track_id)?;
        }
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: LoadDeviceRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let device = ctx
            .browser()
            .load_item(&params.device_id, params.track_id.as_deref())
            .await?;
        tracing::info!(item = %params.device_id, device = device.id(), "browser item loaded");
        Ok(device.info().await?)
    }
}
