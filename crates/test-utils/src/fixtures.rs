//! Sample bulletin documents for tests.
//!
//! The documents are trimmed copies of what the MSC Datamart publishes:
//! CAP 1.2 alerts and citypage weather XML.

/// CAP alert documents.
pub mod cap {
    pub const RAINFALL_WARNING_ID: &str = "urn:oid:2.49.0.1.124.3064862211.2024";
    pub const RAINFALL_UPDATE_ID: &str = "urn:oid:2.49.0.1.124.3064862299.2024";

    /// A moderate rainfall warning covering Toronto.
    pub const RAINFALL_WARNING: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='no'?>
<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>urn:oid:2.49.0.1.124.3064862211.2024</identifier>
  <sender>cap-pac@canada.ca</sender>
  <sent>2024-01-15T12:00:00-00:00</sent>
  <status>Actual</status>
  <msgType>Alert</msgType>
  <source>Env. Can. - Can. Met. Ctr. – Montréal</source>
  <scope>Public</scope>
  <code>CAP-CP:0.4</code>
  <info>
    <language>en-CA</language>
    <category>Met</category>
    <event>rainfall</event>
    <responseType>Monitor</responseType>
    <urgency>Expected</urgency>
    <severity>Moderate</severity>
    <certainty>Likely</certainty>
    <audience>general public</audience>
    <effective>2024-01-15T12:00:00-00:00</effective>
    <expires>2024-01-16T12:00:00-00:00</expires>
    <senderName>Environment Canada</senderName>
    <headline>rainfall warning in effect</headline>
    <description>Heavy rain expected. Total rainfall: 50 to 70 mm.</description>
    <instruction>Avoid low-lying areas.</instruction>
    <parameter><valueName>layer:EC-MSC-SMC:1.0:Alert_Type</valueName><value>warning</value></parameter>
    <parameter><valueName>layer:EC-MSC-SMC:1.0:Alert_Coverage</valueName><value>public</value></parameter>
    <area>
      <areaDesc>City of Toronto</areaDesc>
      <polygon>43.5,-79.8 43.9,-79.8 43.9,-79.1 43.5,-79.1 43.5,-79.8</polygon>
      <geocode><valueName>layer:EC-MSC-SMC:1.0:CLC</valueName><value>062500</value></geocode>
    </area>
  </info>
  <info>
    <language>fr-CA</language>
    <category>Met</category>
    <event>pluie</event>
    <urgency>Expected</urgency>
    <severity>Moderate</severity>
    <certainty>Likely</certainty>
    <expires>2024-01-16T12:00:00-00:00</expires>
    <headline>avertissement de pluie en vigueur</headline>
    <area>
      <areaDesc>Ville de Toronto</areaDesc>
      <polygon>43.5,-79.8 43.9,-79.8 43.9,-79.1 43.5,-79.1 43.5,-79.8</polygon>
    </area>
  </info>
</alert>
"#;

    /// An update escalating [`RAINFALL_WARNING`] to severe.
    pub const RAINFALL_UPDATE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='no'?>
<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>urn:oid:2.49.0.1.124.3064862299.2024</identifier>
  <sender>cap-pac@canada.ca</sender>
  <sent>2024-01-15T18:00:00-00:00</sent>
  <status>Actual</status>
  <msgType>Update</msgType>
  <scope>Public</scope>
  <references>cap-pac@canada.ca,urn:oid:2.49.0.1.124.3064862211.2024,2024-01-15T12:00:00-00:00</references>
  <info>
    <language>en-CA</language>
    <category>Met</category>
    <event>rainfall</event>
    <urgency>Immediate</urgency>
    <severity>Severe</severity>
    <certainty>Observed</certainty>
    <effective>2024-01-15T18:00:00-00:00</effective>
    <expires>2024-01-16T18:00:00-00:00</expires>
    <headline>rainfall warning in effect</headline>
    <description>Total rainfall now expected to reach 90 mm.</description>
    <area>
      <areaDesc>City of Toronto</areaDesc>
      <polygon>43.5,-79.8 43.9,-79.8 43.9,-79.1 43.5,-79.1 43.5,-79.8</polygon>
    </area>
  </info>
</alert>
"#;

    /// Build a minimal CAP document.
    ///
    /// `references` are bare identifiers; they are wrapped into
    /// `sender,identifier,sent` triples.
    pub fn alert_xml(
        identifier: &str,
        severity: &str,
        urgency: &str,
        sent: &str,
        expires: &str,
        references: &[&str],
    ) -> String {
        let references = if references.is_empty() {
            String::new()
        } else {
            let triples: Vec<String> = references
                .iter()
                .map(|r| format!("cap-pac@canada.ca,{},{}", r, sent))
                .collect();
            format!("<references>{}</references>", triples.join(" "))
        };

        format!(
            r#"<?xml version='1.0' encoding='UTF-8'?>
<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>{identifier}</identifier>
  <sender>cap-pac@canada.ca</sender>
  <sent>{sent}</sent>
  <status>Actual</status>
  <msgType>Alert</msgType>
  {references}
  <info>
    <language>en-CA</language>
    <event>test</event>
    <urgency>{urgency}</urgency>
    <severity>{severity}</severity>
    <certainty>Likely</certainty>
    <expires>{expires}</expires>
    <headline>{identifier}</headline>
    <area>
      <areaDesc>Test area</areaDesc>
      <polygon>43.5,-79.8 43.9,-79.8 43.9,-79.1 43.5,-79.1 43.5,-79.8</polygon>
    </area>
  </info>
</alert>
"#
        )
    }
}

/// Citypage weather documents.
pub mod citypage {
    pub const TORONTO_CODE: &str = "s0000458";
    /// Station-local observation stamp used as the uniqueness token.
    pub const TORONTO_TOKEN: &str = "20240115070000";

    /// Build a citypage document for Toronto.
    ///
    /// `local_stamp` is the station-local observation time stamp (EST),
    /// `forecast` is the text of the first forecast period.
    pub fn site_xml(local_stamp: &str, temperature: &str, wind_speed: &str, forecast: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<siteData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <license>https://dd.weather.gc.ca/doc/LICENCE_GENERAL.txt</license>
  <dateTime name="xmlCreation" zone="UTC" UTCOffset="0">
    <year>2024</year>
    <timeStamp>20240115121500</timeStamp>
    <textSummary>Monday January 15, 2024 at 12:15 UTC</textSummary>
  </dateTime>
  <location>
    <continent>North America</continent>
    <country code="ca">Canada</country>
    <province code="on">Ontario</province>
    <name code="s0000458" lat="43.74N" lon="79.37W">Toronto</name>
    <region>City of Toronto</region>
  </location>
  <currentConditions>
    <station code="yyz" lat="43.68N" lon="79.63W">Toronto Pearson Int'l Airport</station>
    <dateTime name="observation" zone="UTC" UTCOffset="0">
      <year>2024</year>
      <hour>12</hour>
      <timeStamp>20240115120000</timeStamp>
      <textSummary>Monday January 15, 2024 at 12:00 UTC</textSummary>
    </dateTime>
    <dateTime name="observation" zone="EST" UTCOffset="-5">
      <year>2024</year>
      <hour>07</hour>
      <timeStamp>{local_stamp}</timeStamp>
      <textSummary>Monday January 15, 2024 at 07:00 EST</textSummary>
    </dateTime>
    <condition>Light Snow</condition>
    <iconCode format="gif">16</iconCode>
    <temperature unitType="metric" units="C">{temperature}</temperature>
    <dewpoint unitType="metric" units="C">-18.0</dewpoint>
    <windChill unitType="metric">-25</windChill>
    <pressure unitType="metric" units="kPa" change="0.12" tendency="rising">102.4</pressure>
    <visibility unitType="metric" units="km">8</visibility>
    <relativeHumidity units="%">62</relativeHumidity>
    <wind>
      <speed unitType="metric" units="km/h">{wind_speed}</speed>
      <gust unitType="metric" units="km/h"></gust>
      <direction>NW</direction>
      <bearing units="degrees">310.0</bearing>
    </wind>
  </currentConditions>
  <forecastGroup>
    <dateTime name="forecastIssue" zone="UTC" UTCOffset="0">
      <timeStamp>20240115100000</timeStamp>
    </dateTime>
    <regionalNormals>
      <textSummary>Low minus 9. High minus 2.</textSummary>
      <temperature unitType="metric" units="C" class="high">-2</temperature>
      <temperature unitType="metric" units="C" class="low">-9</temperature>
    </regionalNormals>
    <forecast>
      <period textForecastName="Today">Monday</period>
      <textSummary>{forecast}</textSummary>
      <abbreviatedForecast>
        <iconCode format="gif">16</iconCode>
        <textSummary>Flurries</textSummary>
      </abbreviatedForecast>
      <temperatures>
        <textSummary>High minus 12.</textSummary>
        <temperature unitType="metric" units="C" class="high">-12</temperature>
      </temperatures>
    </forecast>
    <forecast>
      <period textForecastName="Tonight">Monday night</period>
      <textSummary>Clear. Low minus 22.</textSummary>
      <temperatures>
        <textSummary>Low minus 22.</textSummary>
        <temperature unitType="metric" units="C" class="low">-22</temperature>
      </temperatures>
    </forecast>
  </forecastGroup>
  <riseSet>
    <disclaimer>The information provided here, for the times of the rise and set of the sun, is an estimate included as a convenience to our clients.</disclaimer>
    <dateTime name="sunrise" zone="UTC" UTCOffset="0">
      <timeStamp>20240115123900</timeStamp>
    </dateTime>
    <dateTime name="sunrise" zone="EST" UTCOffset="-5">
      <timeStamp>20240115073900</timeStamp>
    </dateTime>
    <dateTime name="sunset" zone="UTC" UTCOffset="0">
      <timeStamp>20240115220000</timeStamp>
    </dateTime>
    <dateTime name="sunset" zone="EST" UTCOffset="-5">
      <timeStamp>20240115170000</timeStamp>
    </dateTime>
  </riseSet>
  <almanac>
    <temperature class="extremeMax" period="1840-2011" unitType="metric" units="C" year="1932">13.9</temperature>
    <temperature class="extremeMin" period="1840-2011" unitType="metric" units="C" year="1859">-30.0</temperature>
    <temperature class="normalMax" unitType="metric" units="C">-2.0</temperature>
    <temperature class="normalMin" unitType="metric" units="C">-9.0</temperature>
    <precipitation class="extremeRainfall" period="1840-2011" unitType="metric" units="mm" year="1995">28.0</precipitation>
    <pop units="%"></pop>
  </almanac>
</siteData>
"#
        )
    }

    /// The default Toronto document: -15 °C, 30 km/h wind.
    pub fn toronto() -> String {
        site_xml(TORONTO_TOKEN, "-15.0", "30", "Flurries. High minus 12.")
    }
}
