use serde::{Deserialize, Serialize};

use crate::error::{DetectError, DetectResult};
use crate::recognition::{ServerDetection, ServerRecognition};

/// Opaque handle to the class loader that defined a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoaderRef(pub u64);

/// Opaque handle to the protection domain of a defined class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRef(pub u64);

/// A class-definition event as delivered by the instrumentation layer.
#[derive(Clone, Copy, Debug)]
pub struct ClassLoadEvent<'a> {
    /// Internal (`a/b/C`) or binary (`a.b.C`) class name.
    pub class_name: &'a str,
    /// `None` for the bootstrap loader.
    pub loader: Option<LoaderRef>,
    pub domain: Option<DomainRef>,
}

impl<'a> ClassLoadEvent<'a> {
    pub fn new(class_name: &'a str, loader: Option<LoaderRef>, domain: Option<DomainRef>) -> Self {
        Self {
            class_name,
            loader,
            domain,
        }
    }

    /// Event for a class defined by the bootstrap loader without a domain.
    pub fn bootstrap(class_name: &'a str) -> Self {
        Self::new(class_name, None, None)
    }
}

/// The application servers Warden knows how to recognize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerDetector {
    Tomcat,
    JBoss,
    #[serde(rename = "jboss_eap")]
    JBossEap,
    Jetty,
    WebLogic,
    Resin,
    WebSphere,
    Undertow,
}

impl ServerDetector {
    /// Every supported server, in registration order.
    pub const ALL: [ServerDetector; 8] = [
        Self::Tomcat,
        Self::JBoss,
        Self::JBossEap,
        Self::Jetty,
        Self::WebLogic,
        Self::Resin,
        Self::WebSphere,
        Self::Undertow,
    ];

    /// Stable identity used in logs and recognition state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tomcat => "tomcat",
            Self::JBoss => "jboss",
            Self::JBossEap => "jboss_eap",
            Self::Jetty => "jetty",
            Self::WebLogic => "weblogic",
            Self::Resin => "resin",
            Self::WebSphere => "websphere",
            Self::Undertow => "undertow",
        }
    }

    /// Signature classes, in internal form.
    pub fn signatures(&self) -> &'static [&'static str] {
        match self {
            Self::Tomcat => &["org/apache/catalina/util/ServerInfo"],
            Self::JBoss => &[
                "org/jboss/system/server/ServerImpl",
                "org/jboss/as/server/Main",
            ],
            Self::JBossEap => &[
                "org/jboss/as/server/Main",
                "org/jboss/as/version/ProductConfig",
            ],
            Self::Jetty => &["org/eclipse/jetty/server/Server"],
            Self::WebLogic => &["weblogic/version"],
            Self::Resin => &["com/caucho/server/resin/Resin"],
            Self::WebSphere => &["com/ibm/ws/webcontainer/WebContainer"],
            Self::Undertow => &["io/undertow/Undertow"],
        }
    }

    /// Pure predicate: does this class identify the server?
    #[inline]
    pub fn is_class_matched(&self, class_name: &str) -> bool {
        self.signatures()
            .iter()
            .any(|signature| class_name_eq(class_name, signature))
    }

    /// Record the detection into the server-recognition state.
    pub fn handle(
        &self,
        event: &ClassLoadEvent<'_>,
        sink: &dyn ServerRecognition,
    ) -> DetectResult<()> {
        let detection = ServerDetection::new(*self, event);
        sink.record(detection)
            .map_err(|e| DetectError::ActionFailed {
                detector: self.name(),
                class_name: event.class_name.to_string(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Display for ServerDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tomcat => write!(f, "Tomcat"),
            Self::JBoss => write!(f, "JBoss"),
            Self::JBossEap => write!(f, "JBoss EAP"),
            Self::Jetty => write!(f, "Jetty"),
            Self::WebLogic => write!(f, "WebLogic"),
            Self::Resin => write!(f, "Resin"),
            Self::WebSphere => write!(f, "WebSphere"),
            Self::Undertow => write!(f, "Undertow"),
        }
    }
}

/// Compares class names treating `.` and `/` as the same separator.
fn class_name_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == y || (is_separator(x) && is_separator(y)))
}

#[inline]
fn is_separator(b: u8) -> bool {
    b == b'.' || b == b'/'
}
