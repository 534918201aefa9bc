//! Device parameters.

use async_trait::async_trait;
use serde_json::{Value, json};

use ableton_copilot_kernel::{AppContext, KernelError, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use super::{ok, require_finite, require_id};
use crate::models::{DeviceIdRequest, ModifyParameterRequest};

pub struct GetDeviceParameters;

#[async_trait]
impl Tool for GetDeviceParameters {
    type Params = DeviceIdRequest;
    const NAME: &'static str = "get_device_parameters";
    const DESCRIPTION: &'static str = "get a device and its parameters (id, name, value, min, max, is_enabled)";

    fn validate(params: &DeviceIdRequest) -> KernelResult<()> {
        require_id("device_id", &params.device_id)
    }

    async fn call(&self, ctx: &AppContext, params: DeviceIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let device = ctx.device(&params.device_id);
        let info = device.info().await?;
        let mut parameters = Vec::new();
        for parameter in device.parameters().await? {
            parameters.push(parameter.state().await?);
        }
        Ok(json!({ "device": info, "parameters": parameters }))
    }
}

pub struct ModifyDeviceParameterValue;

#[async_trait]
impl Tool for ModifyDeviceParameterValue {
    type Params = ModifyParameterRequest;
    const NAME: &'static str = "modify_device_parameter_value";
    const DESCRIPTION: &'static str = "set device parameter value, only support built-in Live devices";

    fn validate(params: &ModifyParameterRequest) -> KernelResult<()> {
        require_id("parameter_id", &params.parameter_id)?;
        require_finite("value", params.value)
    }

    async fn call(&self, ctx: &AppContext, params: ModifyParameterRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let parameter = ctx.parameter(&params.parameter_id);
        let state = parameter.state().await?;
        if !state.is_enabled {
            return Err(KernelError::invalid_argument(format!(
                "parameter '{}' is disabled and cannot be modified",
                state.name
            )));
        }
        if params.value < state.min || params.value > state.max {
            return Err(KernelError::invalid_argument(format!(
                "value {} for parameter '{}' is outside [{}, {}]",
                params.value, state.name, state.min, state.max
            )));
        }
        parameter.set_value(params.value).await?;
        Ok(ok())
    }
}
