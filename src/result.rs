extern crate anyhow;
extern crate image;
extern crate reqwest;
extern crate rusqlite;
extern crate serde_xml_rs;
extern crate std;

pub type BikeDashResult<T> = std::result::Result<T, BikeDashError>;

#[derive(Debug)]
pub enum BikeDashError {
    ConfigError(String),
    FeedUnavailable(String),
    FeedMalformed(String),
    StoreUnavailable(String),
    ImageError(image::ImageError),
    IoError(std::io::Error),
    OtherError(anyhow::Error),
}

pub fn make_error(msg: &str) -> BikeDashError {
    return BikeDashError::OtherError(anyhow::anyhow!(msg.to_string()));
}

impl std::fmt::Display for BikeDashError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            BikeDashError::ConfigError(ref msg) => {
                return write!(f, "Config Error: {}", msg);
            },
            BikeDashError::FeedUnavailable(ref msg) => {
                return write!(f, "Station feed unavailable: {}", msg);
            },
            BikeDashError::FeedMalformed(ref msg) => {
                return write!(f, "Station feed malformed: {}", msg);
            },
            BikeDashError::StoreUnavailable(ref msg) => {
                return write!(f, "Store unavailable: {}", msg);
            },
            BikeDashError::ImageError(ref err) => {
                return write!(f, "Image Error: {}", err);
            },
            BikeDashError::IoError(ref err) => {
                return write!(f, "IO Error: {}", err);
            },
            BikeDashError::OtherError(ref err) => {
                return write!(f, "Error: {:#}", err);
            },
        }
    }
}

impl std::error::Error for BikeDashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            BikeDashError::ImageError(ref err) => Some(err),
            BikeDashError::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BikeDashError {
    fn from(err: reqwest::Error) -> BikeDashError {
        return BikeDashError::FeedUnavailable(err.to_string());
    }
}

impl From<serde_xml_rs::Error> for BikeDashError {
    fn from(err: serde_xml_rs::Error) -> BikeDashError {
        return BikeDashError::FeedMalformed(err.to_string());
    }
}

impl From<rusqlite::Error> for BikeDashError {
    fn from(err: rusqlite::Error) -> BikeDashError {
        return BikeDashError::StoreUnavailable(err.to_string());
    }
}

impl From<image::ImageError> for BikeDashError {
    fn from(err: image::ImageError) -> BikeDashError {
        return BikeDashError::ImageError(err);
    }
}

impl From<std::io::Error> for BikeDashError {
    fn from(err: std::io::Error) -> BikeDashError {
        return BikeDashError::IoError(err);
    }
}

impl From<anyhow::Error> for BikeDashError {
    fn from(err: anyhow::Error) -> BikeDashError {
        return BikeDashError::OtherError(err);
    }
}
