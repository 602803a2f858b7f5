//! 网关签名（HMAC-SHA256）
//!
//! 签名头格式：`t=<unix 秒>,v1=<hex 签名>`，签名内容为 `{t}.{body}`

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 允许的时间戳偏差（秒），防止回放
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// 生成签名头
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, &'static str> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={digest}"))
}

/// 校验签名头
///
/// 签名比较为常量时间；时间戳超出容忍范围同样视为失败
pub fn verify(secret: &str, header: &str, body: &[u8], now: i64) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("签名头格式错误");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "签名时间戳非法")?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    let sig_bytes = hex::decode(signature).map_err(|_| "签名不是合法的十六进制")?;
    mac.verify_slice(&sig_bytes).map_err(|_| "签名不匹配")?;

    if (now - ts).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err("签名时间戳过期");
    }

    Ok(())
}
