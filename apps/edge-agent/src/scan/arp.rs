/// Host ARP-cache lookup used to enrich devices whose probe reply carried no
/// MAC. Linux asks the kernel per interface via SIOCGARP; macOS walks the
/// routing table's link-layer entries. Elsewhere the MAC stays empty.
pub fn lookup(ip: &str) -> Option<String> {
    let addr: std::net::Ipv4Addr = ip.parse().ok()?;
    query_arp_table(addr)
}

fn format_mac_bytes(mac: &[u8]) -> String {
    mac.iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(target_os = "linux")]
fn query_arp_table(addr: std::net::Ipv4Addr) -> Option<String> {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    let interfaces = if_addrs::get_if_addrs().ok()?;

    let raw_fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if raw_fd < 0 {
        return None;
    }
    let fd: OwnedFd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

    for interface in interfaces {
        if !matches!(interface.addr, if_addrs::IfAddr::V4(_)) {
            continue;
        }

        let mut request: libc::arpreq = unsafe { std::mem::zeroed() };

        let protocol = &mut request.arp_pa as *mut libc::sockaddr as *mut libc::sockaddr_in;
        unsafe {
            (*protocol).sin_family = libc::AF_INET as libc::sa_family_t;
            (*protocol).sin_addr.s_addr = u32::from(addr).to_be();
        }

        let name = interface.name.as_bytes();
        let dev_len = name.len().min(request.arp_dev.len() - 1);
        for (slot, byte) in request.arp_dev[..dev_len].iter_mut().zip(name) {
            *slot = *byte as libc::c_char;
        }

        let rc = unsafe { libc::ioctl(fd.as_raw_fd(), libc::SIOCGARP, &mut request) };
        if rc == 0 && request.arp_ha.sa_family == libc::ARPHRD_ETHER as libc::sa_family_t {
            let mac: Vec<u8> = request.arp_ha.sa_data[..6]
                .iter()
                .map(|b| *b as u8)
                .collect();
            return Some(format_mac_bytes(&mac));
        }
    }
    None
}

#[cfg(target_os = "macos")]
fn query_arp_table(addr: std::net::Ipv4Addr) -> Option<String> {
    let mut mib = [
        libc::CTL_NET,
        libc::PF_ROUTE,
        0,
        libc::AF_INET,
        libc::NET_RT_FLAGS,
        libc::RTF_LLINFO,
    ];

    let mut needed: libc::size_t = 0;
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            std::ptr::null_mut(),
            &mut needed,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc < 0 || needed == 0 {
        return None;
    }

    let mut buffer = vec![0u8; needed];
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            buffer.as_mut_ptr() as *mut libc::c_void,
            &mut needed,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc < 0 {
        return None;
    }
    buffer.truncate(needed);

    let target = u32::from(addr).to_be();
    let mut offset = 0;
    while offset + std::mem::size_of::<libc::rt_msghdr>() <= buffer.len() {
        let header = unsafe { &*(buffer.as_ptr().add(offset) as *const libc::rt_msghdr) };
        let message_len = header.rtm_msglen as usize;
        if message_len == 0 || offset + message_len > buffer.len() {
            break;
        }

        let mut sa_offset = offset + std::mem::size_of::<libc::rt_msghdr>();
        let mut destination: Option<u32> = None;
        let mut link: Option<Vec<u8>> = None;

        for index in 0..32 {
            if header.rtm_addrs & (1 << index) == 0 {
                continue;
            }
            if sa_offset >= offset + message_len {
                break;
            }
            let sa = unsafe { &*(buffer.as_ptr().add(sa_offset) as *const libc::sockaddr) };
            if sa.sa_family == libc::AF_INET as u8 && index == 0 {
                let sin = unsafe { &*(sa as *const libc::sockaddr as *const libc::sockaddr_in) };
                destination = Some(sin.sin_addr.s_addr);
            } else if sa.sa_family == libc::AF_LINK as u8 && index == 1 {
                let sdl = unsafe { &*(sa as *const libc::sockaddr as *const libc::sockaddr_dl) };
                if sdl.sdl_alen == 6 {
                    // sdl_data is declared as a small array but the payload
                    // (name + address) extends past it inside the sysctl
                    // buffer.
                    let data_ptr = sdl.sdl_data.as_ptr() as *const u8;
                    let mac = unsafe {
                        std::slice::from_raw_parts(data_ptr.add(sdl.sdl_nlen as usize), 6)
                    };
                    link = Some(mac.to_vec());
                }
            }

            let mut sa_len = sa.sa_len as usize;
            if sa_len == 0 {
                sa_len = std::mem::size_of::<libc::sockaddr_in>();
            }
            // sockaddrs are rounded up to 4-byte boundaries in routing
            // messages.
            sa_offset += (sa_len + 3) & !3;
        }

        if let (Some(destination), Some(link)) = (destination, link) {
            if destination == target {
                return Some(format_mac_bytes(&link));
            }
        }

        offset += message_len;
    }
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn query_arp_table(_addr: std::net::Ipv4Addr) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_six_bytes_with_colons() {
        assert_eq!(
            format_mac_bytes(&[0xAA, 0xBB, 0xCC, 0x0D, 0xEE, 0x0F]),
            "AA:BB:CC:0D:EE:0F"
        );
    }

    #[test]
    fn non_ipv4_input_yields_none() {
        assert_eq!(lookup("not-an-ip"), None);
        assert_eq!(lookup("fe80::1"), None);
    }
}
