use uuid::Uuid;

pub const MULTICAST_ADDR: &str = "239.255.255.250";
pub const MULTICAST_PORT: u16 = 3702;

const DISCOVERY_URN: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
const PROBE_ACTION: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";

/// SOAP 1.2 WS-Discovery probe for ONVIF network video transmitters. Each
/// probe carries a fresh v4 message id.
pub fn build_probe() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"
            xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <e:Header>
    <w:MessageID>uuid:{}</w:MessageID>
    <w:To>{}</w:To>
    <w:Action>{}</w:Action>
  </e:Header>
  <e:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </e:Body>
</e:Envelope>"#,
        Uuid::new_v4(),
        DISCOVERY_URN,
        PROBE_ACTION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_carries_the_ws_discovery_header() {
        let probe = build_probe();
        assert!(probe.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(probe.contains("<w:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>"));
        assert!(probe.contains(
            "<w:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>"
        ));
        assert!(probe.contains("<d:Types>dn:NetworkVideoTransmitter</d:Types>"));
    }

    #[test]
    fn message_id_is_a_v4_uuid() {
        let probe = build_probe();
        let start = probe.find("uuid:").unwrap() + 5;
        let uuid = &probe[start..start + 36];

        assert_eq!(uuid.len(), 36);
        for (index, ch) in uuid.chars().enumerate() {
            match index {
                8 | 13 | 18 | 23 => assert_eq!(ch, '-'),
                14 => assert_eq!(ch, '4'),
                19 => assert!(matches!(ch, '8' | '9' | 'a' | 'b')),
                _ => assert!(ch.is_ascii_hexdigit()),
            }
        }
    }

    #[test]
    fn each_probe_gets_a_fresh_message_id() {
        assert_ne!(build_probe(), build_probe());
    }
}
