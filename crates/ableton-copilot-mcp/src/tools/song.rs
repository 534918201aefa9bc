//! Song-level tools: info, track list management and recording.

use async_trait::async_trait;
use serde_json::{Value, json};

use ableton_copilot_kernel::{AppContext, KernelError, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use super::{ok, require_finite};
use crate::models::{CreateTrackRequest, EmptyRequest, RecordRequest, TrackIndexRequest};

fn track_index(index: i64) -> KernelResult<()> {
    if index < 0 {
        return Err(KernelError::invalid_argument(format!("index must be non-negative, got {index}")));
    }
    Ok(())
}

pub struct GetSongInfo;

#[async_trait]
impl Tool for GetSongInfo {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_song_info";
    const DESCRIPTION: &'static str = "get song basic info, include tempo, time signature, \
        root_note (begin from 0, C..B), scale name, song length";

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.song().info().await?)
    }
}

pub struct GetAllTracks;

#[async_trait]
impl Tool for GetAllTracks {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_all_tracks";
    const DESCRIPTION: &'static str = "get all midi and audio tracks";

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let tracks = ctx.song().tracks().await?;
        let mut out = Vec::with_capacity(tracks.len());
        for track in tracks {
            out.push(track.info().await?);
        }
        Ok(Value::Array(out))
    }
}

pub struct GetTracksCount;

#[async_trait]
impl Tool for GetTracksCount {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_tracks_count";
    const DESCRIPTION: &'static str = "get midi + audio tracks count";

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(json!(ctx.song().tracks().await?.len()))
    }
}

pub struct CreateTrack;

#[async_trait]
impl Tool for CreateTrack {
    type Params = CreateTrackRequest;
    const NAME: &'static str = "create_track";
    const DESCRIPTION: &'static str = "create a midi, audio or return track and return it";

    fn validate(params: &CreateTrackRequest) -> KernelResult<()> {
        if params.index < -1 {
            return Err(KernelError::invalid_argument(format!(
                "index must be -1 or a track position, got {}",
                params.index
            )));
        }
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: CreateTrackRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let track = ctx.song().create_track(params.kind, params.index).await?;
        tracing::info!(kind = %params.kind, track_id = track.id(), "created track");
        Ok(track.info().await?)
    }
}

pub struct DeleteTrack;

#[async_trait]
impl Tool for DeleteTrack {
    type Params = TrackIndexRequest;
    const NAME: &'static str = "delete_track";
    const DESCRIPTION: &'static str = "delete a midi or audio track by index";

    fn validate(params: &TrackIndexRequest) -> KernelResult<()> {
        track_index(params.index)
    }

    async fn call(&self, ctx: &AppContext, params: TrackIndexRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        ctx.song().delete_track(params.index).await?;
        Ok(ok())
    }
}

pub struct DuplicateTrack;

#[async_trait]
impl Tool for DuplicateTrack {
    type Params = TrackIndexRequest;
    const NAME: &'static str = "duplicate_track";
    const DESCRIPTION: &'static str = "duplicate midi or audio track by index and return the copy";

    fn validate(params: &TrackIndexRequest) -> KernelResult<()> {
        track_index(params.index)
    }

    async fn call(&self, ctx: &AppContext, params: TrackIndexRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let track = ctx.song().duplicate_track(params.index).await?;
        Ok(track.info().await?)
    }
}

pub struct RecordByTimeRange;

#[async_trait]
impl Tool for RecordByTimeRange {
    type Params = RecordRequest;
    const NAME: &'static str = "record_by_time_range";
    const DESCRIPTION: &'static str = "record the armed tracks into the arrangement from start_time to end_time (beats). \
        Returns once the playhead reaches end_time; fails if recording is stopped first";

    fn validate(params: &RecordRequest) -> KernelResult<()> {
        require_finite("start_time", params.start_time)?;
        require_finite("end_time", params.end_time)?;
        if params.end_time <= params.start_time {
            return Err(KernelError::invalid_argument("end_time must be greater than start_time"));
        }
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: RecordRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let report = ctx
            .recorder
            .record_by_time_range(params.start_time, params.end_time)
            .await?;
        Ok(serde_json::to_value(report)?)
    }
}
