//! Track inspection, clip creation and track properties.

use async_trait::async_trait;
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelError, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use super::{require_finite, require_id};
use crate::models::{CreateMidiClipRequest, DuplicateClipToTrackRequest, SetTrackPropertyRequest, TrackIdRequest};

fn arrangement_time(time: f64) -> KernelResult<()> {
    require_finite("time", time)?;
    if time < 0.0 {
        return Err(KernelError::invalid_argument(format!("time must be non-negative, got {time}")));
    }
    Ok(())
}

pub struct GetTrackInfoById;

#[async_trait]
impl Tool for GetTrackInfoById {
    type Params = TrackIdRequest;
    const NAME: &'static str = "get_track_info_by_id";
    const DESCRIPTION: &'static str = "get track info by id";

    fn validate(params: &TrackIdRequest) -> KernelResult<()> {
        require_id("track_id", &params.track_id)
    }

    async fn call(&self, ctx: &AppContext, params: TrackIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.track(&params.track_id).info().await?)
    }
}

pub struct GetClipsByTrackId;

#[async_trait]
impl Tool for GetClipsByTrackId {
    type Params = TrackIdRequest;
    const NAME: &'static str = "get_clips_by_track_id";
    const DESCRIPTION: &'static str = "get all arrangement clips by track id";

    fn validate(params: &TrackIdRequest) -> KernelResult<()> {
        require_id("track_id", &params.track_id)
    }

    async fn call(&self, ctx: &AppContext, params: TrackIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let clips = ctx.track(&params.track_id).arrangement_clips().await?;
        let mut out = Vec::with_capacity(clips.len());
        for clip in clips {
            out.push(clip.info().await?);
        }
        Ok(Value::Array(out))
    }
}

pub struct GetTrackAvailableInputRoutings;

#[async_trait]
impl Tool for GetTrackAvailableInputRoutings {
    type Params = TrackIdRequest;
    const NAME: &'static str = "get_track_available_input_routings";
    const DESCRIPTION: &'static str = "get the display names of a track's available input routing types";

    fn validate(params: &TrackIdRequest) -> KernelResult<()> {
        require_id("track_id", &params.track_id)
    }

    async fn call(&self, ctx: &AppContext, params: TrackIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let routings = ctx.track(&params.track_id).available_input_routings().await?;
        Ok(serde_json::to_value(routings)?)
    }
}

pub struct CreateEmptyMidiClip;

#[async_trait]
impl Tool for CreateEmptyMidiClip {
    type Params = CreateMidiClipRequest;
    const NAME: &'static str = "create_empty_midi_clip";
    const DESCRIPTION: &'static str = "create an empty midi clip in the arrangement of a track and return it";

    fn validate(params: &CreateMidiClipRequest) -> KernelResult<()> {
        require_id("track_id", &params.track_id)?;
        arrangement_time(params.time)?;
        require_finite("length", params.length)?;
        if params.length <= 0.0 {
            return Err(KernelError::invalid_argument("length must be greater than 0.0"));
        }
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: CreateMidiClipRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let clip = ctx
            .track(&params.track_id)
            .create_midi_clip(params.time, params.length)
            .await?;
        tracing::debug!(track_id = %params.track_id, clip_id = clip.id(), "created midi clip");
        Ok(clip.info().await?)
    }
}

pub struct SetTrackProperty;

#[async_trait]
impl Tool for SetTrackProperty {
    type Params = SetTrackPropertyRequest;
    const NAME: &'static str = "set_track_property";
    const DESCRIPTION: &'static str = "set track properties (name, color, mute, solo, arm) and return the updated track";

    fn validate(params: &SetTrackPropertyRequest) -> KernelResult<()> {
        require_id("track_id", &params.track_id)
    }

    async fn call(&self, ctx: &AppContext, params: SetTrackPropertyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.track(&params.track_id).apply(params.property).await?)
    }
}

pub struct DuplicateClipToTrack;

#[async_trait]
impl Tool for DuplicateClipToTrack {
    type Params = DuplicateClipToTrackRequest;
    const NAME: &'static str = "duplicate_clip_to_track";
    const DESCRIPTION: &'static str = "duplicate clip to the arrangement of a track at the given time";

    fn validate(params: &DuplicateClipToTrackRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)?;
        require_id("track_id", &params.track_id)?;
        arrangement_time(params.time)
    }

    async fn call(
        &self,
        ctx: &AppContext,
        params: DuplicateClipToTrackRequest,
        _: Option<HistoryId>,
    ) -> KernelResult<Value> {
        let clip = ctx
            .track(&params.track_id)
            .duplicate_clip_to_arrangement(&params.clip_id, params.time)
            .await?;
        Ok(clip.info().await?)
    }
}
