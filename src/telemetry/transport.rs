//! 遥测传输层
//!
//! 传输机制对链路可注入：重连策略、订阅分发与具体协议解耦。
//! 生产实现为 MQTT（传感器网关协议），测试中用脚本化的假传输。

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::errors::AppError;

/// 一条已建立的遥测流
#[async_trait]
pub trait TelemetryStream: Send {
    /// 读取下一条原始消息；`Ok(None)` 表示对端正常关闭
    async fn next_message(&mut self) -> Result<Option<String>, AppError>;
}

/// 遥测传输接口
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// 建立连接，返回消息流
    async fn connect(&self) -> Result<Box<dyn TelemetryStream>, AppError>;
}

/// MQTT 传输实现
pub struct MqttTransport {
    settings: GatewaySettings,
}

impl MqttTransport {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TelemetryTransport for MqttTransport {
    async fn connect(&self) -> Result<Box<dyn TelemetryStream>, AppError> {
        // 每次连接使用新的客户端 ID，避免与半死连接互踢
        let client_id = format!("{}_{}", self.settings.client_id_prefix, Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, &self.settings.host, self.settings.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(options, 100);
        client
            .subscribe(&self.settings.topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| AppError::LinkError(format!("MQTT 订阅失败: {}", e)))?;

        Ok(Box::new(MqttStream {
            eventloop,
            _client: client,
        }))
    }
}

/// MQTT 消息流
struct MqttStream {
    eventloop: EventLoop,
    // eventloop 存活期间客户端必须保持持有
    _client: AsyncClient,
}

#[async_trait]
impl TelemetryStream for MqttStream {
    async fn next_message(&mut self) -> Result<Option<String>, AppError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match String::from_utf8(publish.payload.to_vec()) {
                        Ok(text) => return Ok(Some(text)),
                        Err(e) => {
                            // 单条坏报文不应触发重连，丢弃继续
                            tracing::warn!(error = %e, "报文非 UTF-8，已丢弃");
                            continue;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                // 其余协议事件（心跳、确认等）不产生消息
                Ok(_) => continue,
                Err(e) => return Err(AppError::LinkError(format!("MQTT 连接错误: {}", e))),
            }
        }
    }
}
