//! Scripted in-memory device used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pmotr064::errors::{Result, Tr064Error};
use pmotr064::http::{HttpResponse, HttpTransport};

pub const HOST: &str = "fritz.test";
pub const BASE_URL: &str = "http://fritz.test:49000";
pub const LAN_UUID: &str = "75802409-bccb-40e7-8e6d-3431C4D7A5F9";
pub const FOO_SERVICE_ID: &str = "urn:X:serviceId:Y";

/// One request seen by the fake device.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub action: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
pub struct FakeDevice {
    documents: Mutex<HashMap<String, String>>,
    unreachable: AtomicBool,
    scripted: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    defaults: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<Recorded>>,
    delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    timeline: Mutex<Vec<String>>,
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A device serving the standard fixture documents.
    pub fn fritzbox() -> Arc<Self> {
        let device = Self::new();
        device.serve("/tr64desc.xml", ROOT_DESCRIPTION);
        device.serve("/deviceinfoSCPD.xml", DEVICE_INFO_SCPD);
        device.serve("/ySCPD.xml", FOO_SCPD);
        device.serve("/hostsSCPD.xml", HOSTS_SCPD);
        device.serve("/wlanconfigSCPD.xml", WLAN_SCPD);
        device.respond("GetSecurityPort", soap_fault("401", "Invalid Action"));
        device.respond(
            "GetInfo",
            soap_response(
                "GetInfo",
                &[
                    ("NewModelName", "FRITZ!Box 7590"),
                    ("NewSerialNumber", "3431C4D7A5F9"),
                    ("NewSoftwareVersion", "154.07.57"),
                    ("NewEnable", "1"),
                ],
            ),
        );
        device
    }

    pub fn serve(&self, path: &str, body: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Response used for `action` once the scripted queue is empty.
    pub fn respond(&self, action: &str, response: HttpResponse) {
        self.defaults
            .lock()
            .unwrap()
            .insert(action.to_string(), response);
    }

    /// Response used for the next call of `action` only.
    pub fn script(&self, action: &str, response: HttpResponse) {
        self.scripted
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(response);
    }

    /// Make every call of `action` take `delay` before answering.
    pub fn delay(&self, action: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(action.to_string(), delay);
    }

    /// Highest number of POSTs seen running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `begin <action>` and `end <action>` markers in POST order.
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, action: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.action.as_deref() == Some(action))
            .count()
    }

    pub fn last_call(&self, action: &str) -> Option<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.action.as_deref() == Some(action))
            .cloned()
    }

    pub fn posts_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == "POST" && path_of(&r.url) == path)
            .count()
    }

    pub fn gets(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == "GET" && path_of(&r.url) == path)
            .count()
    }
}

impl HttpTransport for FakeDevice {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(Recorded {
            method: "GET",
            url: url.to_string(),
            action: None,
            headers: Vec::new(),
            body: String::new(),
        });

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Tr064Error::communication(format!("GET {url} failed: connection refused")));
        }

        match self.documents.lock().unwrap().get(path_of(url)) {
            Some(body) => Ok(HttpResponse::new(200, body.clone())),
            None => Ok(HttpResponse::new(404, "Not Found")),
        }
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
        _timeout: Duration,
    ) -> Result<HttpResponse> {
        let action = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("SOAPAction"))
            .and_then(|(_, v)| v.split_once('#'))
            .map(|(_, a)| a.to_string());
        let label = action.clone().unwrap_or_default();

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(format!("begin {label}"));

        let response = self.answer(url, action, headers, body);

        let delay = self.delays.lock().unwrap().get(&label).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.timeline.lock().unwrap().push(format!("end {label}"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

impl FakeDevice {
    fn answer(
        &self,
        url: &str,
        action: Option<String>,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(Recorded {
            method: "POST",
            url: url.to_string(),
            action: action.clone(),
            headers: headers.to_vec(),
            body: body.to_string(),
        });

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Tr064Error::communication(format!("POST {url} failed: connection refused")));
        }

        let Some(action) = action else {
            return Ok(soap_fault("401", "Invalid Action"));
        };
        if let Some(response) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&action)
            .and_then(|queue| queue.pop_front())
        {
            return Ok(response);
        }
        Ok(self
            .defaults
            .lock()
            .unwrap()
            .get(&action)
            .cloned()
            .unwrap_or_else(|| soap_fault("401", "Invalid Action")))
    }
}

pub fn soap_response(action: &str, values: &[(&str, &str)]) -> HttpResponse {
    let arguments: String = values
        .iter()
        .map(|(name, value)| format!("<{name}>{value}</{name}>"))
        .collect();
    HttpResponse::new(
        200,
        format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body><u:{action}Response xmlns:u="urn:fake">{arguments}</u:{action}Response></s:Body>
</s:Envelope>"#
        ),
    )
}

pub fn soap_fault(code: &str, description: &str) -> HttpResponse {
    HttpResponse::new(
        500,
        format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>
<detail><UPnPError xmlns="urn:dslforum-org:control-1-0"><errorCode>{code}</errorCode><errorDescription>{description}</errorDescription></UPnPError></detail>
</s:Fault></s:Body>
</s:Envelope>"#
        ),
    )
}

pub fn unauthorized(nonce: &str) -> HttpResponse {
    HttpResponse::new(401, "Unauthorized").with_header(
        "WWW-Authenticate",
        format!(r#"Digest realm="F!Box SOAP-Auth", nonce="{nonce}", algorithm=MD5, qop="auth""#),
    )
}

/// Route library logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Wait for the first event matching `predicate`, skipping the others.
pub async fn next_event<F>(
    events: &crossbeam_channel::Receiver<pmotr064::SessionEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Option<pmotr064::SessionEvent>
where
    F: FnMut(&pmotr064::SessionEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        while let Ok(event) = events.try_recv() {
            if predicate(&event) {
                return Some(event);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

/// Channel table covering the fixture documents.
pub const TEST_CHANNELS: &str = r#"
channels:
  - name: foo
    label: Foo
    service:
      service_id: "urn:X:serviceId:Y"
    get_action:
      name: GetFoo
      argument: NewFoo
    set_action:
      name: SetFoo
      argument: NewFoo

  - name: fooCount
    label: Foo Count
    service:
      service_id: "urn:X:serviceId:Y"
    get_action:
      name: GetFoo
      argument: NewCount

  - name: fooRate
    label: Foo Rate
    service:
      service_id: "urn:X:serviceId:Y"
    get_action:
      name: GetFoo
      argument: NewRate
    unit: kbit/s
    wire_unit: bit/s

  - name: macOnline
    label: MAC Online
    service:
      service_id: "urn:LanDeviceHosts-com:serviceId:Hosts1"
    get_action:
      name: GetSpecificHostEntry
      argument: NewActive
      parameter:
        name: NewMACAddress
        thing_parameter: macOnline
        pattern: "([0-9A-F]{2}:){5}[0-9A-F]{2}"

  - name: hostsLastChange
    label: Hosts Last Change
    last_seen: true
    service:
      service_id: "urn:LanDeviceHosts-com:serviceId:Hosts1"
    get_action:
      name: X_AVM-DE_GetChangeCounter
      argument: NewX_AVM-DE_GetChangeCounter

  - name: wifi24GHzEnable
    label: WiFi 2.4 GHz
    service:
      device_type: "urn:dslforum-org:device:LANDevice:1"
      service_id: "urn:WLANConfiguration-com:serviceId:WLANConfiguration1"
    get_action:
      name: GetInfo
      argument: NewEnable
    set_action:
      name: SetEnable
      argument: NewEnable

  - name: missing
    label: Missing Action
    service:
      service_id: "urn:X:serviceId:Y"
    get_action:
      name: GetNothing
      argument: NewNothing
"#;

pub const ROOT_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:dslforum-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:dslforum-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName>FRITZ!Box 7590</friendlyName>
    <manufacturer>AVM</manufacturer>
    <modelName>FRITZ!Box 7590</modelName>
    <UDN>uuid:75802409-bccb-40e7-8e6c-3431C4D7A5F9</UDN>
    <serviceList>
      <service>
        <serviceType>urn:dslforum-org:service:DeviceInfo:1</serviceType>
        <serviceId>urn:DeviceInfo-com:serviceId:DeviceInfo1</serviceId>
        <controlURL>/upnp/control/deviceinfo</controlURL>
        <eventSubURL>/upnp/control/deviceinfo</eventSubURL>
        <SCPDURL>/deviceinfoSCPD.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:X:service:Y:1</serviceType>
        <serviceId>urn:X:serviceId:Y</serviceId>
        <controlURL>/upnp/control/y</controlURL>
        <eventSubURL>/upnp/control/y</eventSubURL>
        <SCPDURL>/ySCPD.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:dslforum-org:service:Hosts:1</serviceType>
        <serviceId>urn:LanDeviceHosts-com:serviceId:Hosts1</serviceId>
        <controlURL>/upnp/control/hosts</controlURL>
        <eventSubURL>/upnp/control/hosts</eventSubURL>
        <SCPDURL>/hostsSCPD.xml</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:dslforum-org:device:LANDevice:1</deviceType>
        <friendlyName>LANDevice - FRITZ!Box 7590</friendlyName>
        <UDN>uuid:75802409-bccb-40e7-8e6d-3431C4D7A5F9</UDN>
        <serviceList>
          <service>
            <serviceType>urn:dslforum-org:service:WLANConfiguration:1</serviceType>
            <serviceId>urn:WLANConfiguration-com:serviceId:WLANConfiguration1</serviceId>
            <controlURL>/upnp/control/wlanconfig1</controlURL>
            <eventSubURL>/upnp/control/wlanconfig1</eventSubURL>
            <SCPDURL>/wlanconfigSCPD.xml</SCPDURL>
          </service>
        </serviceList>
      </device>
      <device>
        <deviceType>urn:dslforum-org:device:WANDevice:1</deviceType>
        <friendlyName>WANDevice - FRITZ!Box 7590</friendlyName>
        <UDN>uuid:76802409-bccb-40e7-8e6e-3431C4D7A5F9</UDN>
        <serviceList/>
        <deviceList>
          <device>
            <deviceType>urn:dslforum-org:device:WANConnectionDevice:1</deviceType>
            <UDN>uuid:76802409-bccb-40e7-8e6f-3431C4D7A5F9</UDN>
            <serviceList/>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

pub const DEVICE_INFO_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
  <actionList>
    <action>
      <name>GetInfo</name>
      <argumentList>
        <argument><name>NewManufacturerName</name><direction>out</direction><relatedStateVariable>ManufacturerName</relatedStateVariable></argument>
        <argument><name>NewModelName</name><direction>out</direction><relatedStateVariable>ModelName</relatedStateVariable></argument>
        <argument><name>NewSerialNumber</name><direction>out</direction><relatedStateVariable>SerialNumber</relatedStateVariable></argument>
        <argument><name>NewSoftwareVersion</name><direction>out</direction><relatedStateVariable>SoftwareVersion</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetSecurityPort</name>
      <argumentList>
        <argument><name>NewSecurityPort</name><direction>out</direction><relatedStateVariable>X_AVM-DE_SecurityPort</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable><name>ManufacturerName</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>ModelName</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>SerialNumber</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>SoftwareVersion</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>X_AVM-DE_SecurityPort</name><dataType>ui2</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

pub const FOO_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
  <actionList>
    <action>
      <name>GetFoo</name>
      <argumentList>
        <argument><name>NewFoo</name><direction>out</direction><relatedStateVariable>Foo</relatedStateVariable></argument>
        <argument><name>NewCount</name><direction>out</direction><relatedStateVariable>Count</relatedStateVariable></argument>
        <argument><name>NewRate</name><direction>out</direction><relatedStateVariable>Rate</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>SetFoo</name>
      <argumentList>
        <argument><name>NewFoo</name><direction>in</direction><relatedStateVariable>Foo</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable><name>Foo</name><dataType>boolean</dataType></stateVariable>
    <stateVariable><name>Count</name><dataType>ui2</dataType></stateVariable>
    <stateVariable><name>Rate</name><dataType>ui4</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

pub const HOSTS_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
  <actionList>
    <action>
      <name>GetSpecificHostEntry</name>
      <argumentList>
        <argument><name>NewMACAddress</name><direction>in</direction><relatedStateVariable>MACAddress</relatedStateVariable></argument>
        <argument><name>NewIPAddress</name><direction>out</direction><relatedStateVariable>IPAddress</relatedStateVariable></argument>
        <argument><name>NewActive</name><direction>out</direction><relatedStateVariable>Active</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>X_AVM-DE_GetChangeCounter</name>
      <argumentList>
        <argument><name>NewX_AVM-DE_GetChangeCounter</name><direction>out</direction><relatedStateVariable>X_AVM-DE_ChangeCounter</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable><name>MACAddress</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>IPAddress</name><dataType>string</dataType></stateVariable>
    <stateVariable><name>Active</name><dataType>boolean</dataType></stateVariable>
    <stateVariable><name>X_AVM-DE_ChangeCounter</name><dataType>ui4</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

pub const WLAN_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
  <actionList>
    <action>
      <name>GetInfo</name>
      <argumentList>
        <argument><name>NewEnable</name><direction>out</direction><relatedStateVariable>Enable</relatedStateVariable></argument>
        <argument><name>NewSSID</name><direction>out</direction><relatedStateVariable>SSID</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>SetEnable</name>
      <argumentList>
        <argument><name>NewEnable</name><direction>in</direction><relatedStateVariable>Enable</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable><name>Enable</name><dataType>boolean</dataType></stateVariable>
    <stateVariable><name>SSID</name><dataType>string</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;
