use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::AppError;

/// Backend ids arrive as JSON numbers or strings; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Int(n) => Ok(Self(n.to_string())),
            NumberOrString::Float(n) => Ok(Self(n.to_string())),
            NumberOrString::Text(s) => Ok(Self(s)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

fn deserialize_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<NumberOrString>::deserialize(deserializer)?;
    let quantity = match raw {
        Some(NumberOrString::Int(n)) => u32::try_from(n).unwrap_or(0),
        Some(NumberOrString::Float(n)) if n.is_finite() && n >= 0.0 => n as u32,
        Some(NumberOrString::Text(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    Ok(quantity)
}

/// Which badge an order shows in the driver's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusBucket {
    InProgress,
    NotStarted,
}

impl StatusBucket {
    pub fn label(self) -> &'static str {
        match self {
            StatusBucket::InProgress => "PROSES",
            StatusBucket::NotStarted => "BELUM",
        }
    }
}

/// Backend status parsed once on receipt. The backend sends free text, so
/// anything unknown lands in `Unrecognized` with the original value kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Proses,
    DalamProses,
    SedangProses,
    Pengiriman(String),
    Unrecognized(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        match lower.as_str() {
            "proses" => OrderStatus::Proses,
            "dalam_proses" => OrderStatus::DalamProses,
            "sedang_proses" => OrderStatus::SedangProses,
            _ if lower.contains("pengiriman") => OrderStatus::Pengiriman(raw.to_string()),
            _ => OrderStatus::Unrecognized(raw.to_string()),
        }
    }

    pub fn bucket(&self) -> StatusBucket {
        match self {
            OrderStatus::Unrecognized(_) => StatusBucket::NotStarted,
            _ => StatusBucket::InProgress,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Proses => "proses",
            OrderStatus::DalamProses => "dalam_proses",
            OrderStatus::SedangProses => "sedang_proses",
            OrderStatus::Pengiriman(raw) | OrderStatus::Unrecognized(raw) => raw,
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Unrecognized(String::new())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(OrderStatus::parse(raw.as_deref().unwrap_or_default()))
    }
}

pub fn classify(status: &str) -> StatusBucket {
    OrderStatus::parse(status).bucket()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "nama_lengkap", default)]
    pub name: Option<String>,
    #[serde(rename = "nomor_telepon", default)]
    pub phone: Option<String>,
    #[serde(rename = "alamat", default)]
    pub address: Option<String>,
}

impl Customer {
    pub fn display_name(&self) -> &str {
        non_empty(self.name.as_deref()).unwrap_or("Pelanggan")
    }

    pub fn display_phone(&self) -> &str {
        non_empty(self.phone.as_deref()).unwrap_or("-")
    }

    pub fn display_address(&self) -> &str {
        non_empty(self.address.as_deref()).unwrap_or("-")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Row of the driver's assigned-order list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(rename = "pelanggan", default)]
    pub customer: Option<Customer>,
    #[serde(rename = "jumlah_pesanan", default, deserialize_with = "deserialize_quantity")]
    pub quantity_packs: u32,
}

impl Order {
    pub fn bucket(&self) -> StatusBucket {
        self.status.bucket()
    }

    pub fn customer_or_default(&self) -> Customer {
        self.customer.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderListEnvelope {
    #[serde(default)]
    pub pesanan: Option<Vec<Order>>,
}

/// Full record shown on the order detail screen. Unlike [`Order`], the
/// customer is mandatory: a payload without it is rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetail {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer: Customer,
    pub quantity_packs: u32,
}

#[derive(Deserialize)]
struct RawDetail {
    #[serde(default)]
    id: Option<OrderId>,
    #[serde(default)]
    status: OrderStatus,
    #[serde(rename = "pelanggan", default)]
    customer: Option<Customer>,
    #[serde(rename = "jumlah_pesanan", default, deserialize_with = "deserialize_quantity")]
    quantity_packs: u32,
}

impl OrderDetail {
    /// Accepts `{pesanan: {...}}` or `{data: {pesanan: {...}}}`.
    pub fn from_envelope(requested: &OrderId, payload: Value) -> Result<Self, AppError> {
        let order = payload
            .get("pesanan")
            .filter(|v| !v.is_null())
            .or_else(|| payload.get("data").and_then(|d| d.get("pesanan")))
            .filter(|v| v.is_object())
            .cloned()
            .ok_or_else(|| AppError::MalformedPayload("order data is missing".to_string()))?;

        if !order.get("pelanggan").is_some_and(Value::is_object) {
            return Err(AppError::MalformedPayload(format!(
                "order {requested} has no customer record"
            )));
        }

        let raw: RawDetail = serde_json::from_value(order)
            .map_err(|err| AppError::MalformedPayload(format!("order {requested}: {err}")))?;

        let customer = raw
            .customer
            .ok_or_else(|| AppError::MalformedPayload("customer record is null".to_string()))?;

        Ok(Self {
            id: raw.id.unwrap_or_else(|| requested.clone()),
            status: raw.status,
            customer,
            quantity_packs: raw.quantity_packs,
        })
    }
}
